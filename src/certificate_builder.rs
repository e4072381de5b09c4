//! X.509 building blocks for the in-process signing backend
//!
//! Key generation, CSR creation and certificate signing for all three tiers:
//!
//! ```text
//! Root CA (self-signed, pathlen=1)
//!   └── Intermediate CA (signed from CSR by Root, pathlen=0)
//!       └── Leaf certificate (signed by Intermediate, CA=false)
//! ```
//!
//! All certificates are X.509v3, signed with SHA-256, and carry a random
//! 128-bit serial number.

use openssl::asn1::{Asn1Integer, Asn1IntegerRef, Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Extension, X509Name, X509Req, X509Ref, X509};

use crate::error::{PkiError, Result};
use crate::hierarchy::{self, ExtKeyUsage, KeySpec, KeyType, RolePolicy};
use crate::requests::SubjectFields;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const CSR_VERSION_1: i32 = 0;
const ROOT_CA_PATH_LENGTH: u32 = 1;
const INTERMEDIATE_CA_PATH_LENGTH: u32 = 0; // Can only sign end-entity certs, not other CAs
const SERIAL_BITS: i32 = 128;

fn crypto(msg: &'static str) -> impl Fn(ErrorStack) -> PkiError {
    move |e| PkiError::Crypto(format!("{msg}: {e}"))
}

/// Validity window in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: i64,
    pub not_after: i64,
}

pub fn generate_private_key(spec: &KeySpec) -> Result<PKey<Private>> {
    match spec.key_type {
        KeyType::Rsa => {
            let rsa = Rsa::generate(spec.bits).map_err(crypto("Failed to generate RSA keypair"))?;
            PKey::from_rsa(rsa).map_err(crypto("Failed to create private key"))
        }
        KeyType::Ec => {
            let curve = match spec.bits {
                256 => Nid::X9_62_PRIME256V1,
                384 => Nid::SECP384R1,
                521 => Nid::SECP521R1,
                other => {
                    return Err(PkiError::Crypto(format!(
                        "unsupported EC key size {other}, expected 256, 384 or 521"
                    )))
                }
            };
            let group = EcGroup::from_curve_name(curve).map_err(crypto("Failed to load EC curve"))?;
            let ec = EcKey::generate(&group).map_err(crypto("Failed to generate EC keypair"))?;
            PKey::from_ec_key(ec).map_err(crypto("Failed to create private key"))
        }
    }
}

pub fn random_serial() -> Result<Asn1Integer> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

/// Serial in the backend's notation: lowercase hex pairs joined by `:`.
pub fn format_serial(serial: &Asn1IntegerRef) -> Result<String> {
    let hex = serial.to_bn()?.to_hex_str()?.to_lowercase();
    let hex = if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else {
        hex
    };
    let pairs: Vec<&str> = (0..hex.len())
        .step_by(2)
        .map(|i| &hex[i..i + 2])
        .collect();
    Ok(pairs.join(":"))
}

/// `pathlen` from the certificate's basic constraints; `None` when the
/// constraint is absent.
pub fn path_length(cert: &X509Ref) -> Result<Option<u32>> {
    let text = cert.to_text().map_err(crypto("Failed to render certificate"))?;
    let text = String::from_utf8_lossy(&text);
    Ok(text.split("pathlen:").nth(1).and_then(|rest| {
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }))
}

pub fn asn1_to_unix(time: &Asn1TimeRef) -> Result<i64> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

pub fn build_name(subject: &SubjectFields) -> Result<X509Name> {
    let mut name_builder = X509Name::builder().map_err(crypto("Failed to create name builder"))?;
    name_builder
        .append_entry_by_nid(Nid::COMMONNAME, &subject.common_name)
        .map_err(crypto("Failed to set CN"))?;
    let optional = [
        (Nid::ORGANIZATIONNAME, &subject.organization),
        (Nid::ORGANIZATIONALUNITNAME, &subject.organizational_unit),
        (Nid::LOCALITYNAME, &subject.locality),
        (Nid::STATEORPROVINCENAME, &subject.state),
        (Nid::COUNTRYNAME, &subject.country),
        (Nid::PKCS9_EMAILADDRESS, &subject.email),
    ];
    for (nid, value) in optional {
        if let Some(value) = value {
            name_builder
                .append_entry_by_nid(nid, value)
                .map_err(|e| PkiError::Crypto(format!("Failed to set {}: {e}", nid.short_name().unwrap_or("RDN"))))?;
        }
    }
    Ok(name_builder.build())
}

fn ca_extensions(path_length: u32) -> Result<Vec<X509Extension>> {
    let basic_constraints = BasicConstraints::new()
        .critical()
        .ca()
        .pathlen(path_length)
        .build()
        .map_err(crypto("Failed to build BasicConstraints"))?;
    let key_usage = KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .digital_signature()
        .build()
        .map_err(crypto("Failed to build KeyUsage"))?;
    Ok(vec![basic_constraints, key_usage])
}

/// Self-signed root certificate.
pub fn self_signed_root(
    key: &PKey<Private>,
    common_name: &str,
    validity: Validity,
) -> Result<X509> {
    let mut builder = X509::builder().map_err(crypto("Failed to create X509 builder"))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(crypto("Failed to set version"))?;
    let serial = random_serial()?;
    builder
        .set_serial_number(&serial)
        .map_err(crypto("Failed to set serial number"))?;

    let name = build_name(&SubjectFields::new(common_name))?;
    builder
        .set_subject_name(&name)
        .map_err(crypto("Failed to set subject"))?;
    builder
        .set_issuer_name(&name)
        .map_err(crypto("Failed to set issuer"))?;
    set_validity(&mut builder, validity)?;
    builder
        .set_pubkey(key)
        .map_err(crypto("Failed to set public key"))?;

    for extension in ca_extensions(ROOT_CA_PATH_LENGTH)? {
        builder
            .append_extension(extension)
            .map_err(crypto("Failed to add CA extension"))?;
    }
    builder
        .sign(key, MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate"))?;
    Ok(builder.build())
}

/// CSR for a subordinate CA, declaring CA extensions for the parent to honor.
pub fn build_ca_csr(key: &PKey<Private>, common_name: &str) -> Result<X509Req> {
    let mut builder = X509Req::builder().map_err(crypto("Failed to create CSR builder"))?;
    builder
        .set_version(CSR_VERSION_1)
        .map_err(crypto("Failed to set CSR version"))?;
    let name = build_name(&SubjectFields::new(common_name))?;
    builder
        .set_subject_name(&name)
        .map_err(crypto("Failed to set CSR subject"))?;
    builder
        .set_pubkey(key)
        .map_err(crypto("Failed to set CSR public key"))?;

    let mut extensions = Stack::new()?;
    for extension in ca_extensions(INTERMEDIATE_CA_PATH_LENGTH)? {
        extensions.push(extension)?;
    }
    builder
        .add_extensions(&extensions)
        .map_err(crypto("Failed to add CSR extensions"))?;
    builder
        .sign(key, MessageDigest::sha256())
        .map_err(crypto("Failed to sign CSR"))?;
    Ok(builder.build())
}

/// Sign a subordinate CA CSR with the parent's key.
///
/// With `use_csr_values` the CSR's own extensions are copied; otherwise the
/// standard intermediate extensions (CA=true, pathlen=0) are applied.
pub fn sign_ca_csr(
    ca_key: &PKey<Private>,
    ca_cert: &X509Ref,
    csr: &X509Req,
    validity: Validity,
    use_csr_values: bool,
) -> Result<X509> {
    let csr_key = csr.public_key().map_err(crypto("Failed to read CSR public key"))?;
    if !csr.verify(&csr_key).map_err(crypto("Failed to verify CSR"))? {
        return Err(PkiError::Crypto("CSR signature does not verify".to_string()));
    }

    let mut builder = X509::builder().map_err(crypto("Failed to create X509 builder"))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(crypto("Failed to set version"))?;
    let serial = random_serial()?;
    builder
        .set_serial_number(&serial)
        .map_err(crypto("Failed to set serial number"))?;
    builder
        .set_subject_name(csr.subject_name())
        .map_err(crypto("Failed to set subject from CSR"))?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .map_err(crypto("Failed to set issuer from parent CA"))?;
    set_validity(&mut builder, validity)?;
    builder
        .set_pubkey(&csr_key)
        .map_err(crypto("Failed to set public key"))?;

    let csr_extensions = if use_csr_values {
        csr.extensions()
            .map(|stack| stack.into_iter().collect::<Vec<_>>())
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    let extensions = if csr_extensions.is_empty() {
        ca_extensions(INTERMEDIATE_CA_PATH_LENGTH)?
    } else {
        csr_extensions
    };
    for extension in extensions {
        builder
            .append_extension(extension)
            .map_err(crypto("Failed to add extension"))?;
    }
    builder
        .sign(ca_key, MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate"))?;
    Ok(builder.build())
}

/// Sign an end-entity certificate under `policy`.
pub fn sign_leaf(
    ca_key: &PKey<Private>,
    ca_cert: &X509Ref,
    subject: &SubjectFields,
    leaf_key: &PKey<Private>,
    policy: &RolePolicy,
    validity: Validity,
) -> Result<X509> {
    let mut builder = X509::builder().map_err(crypto("Failed to create X509 builder"))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(crypto("Failed to set version"))?;
    let serial = random_serial()?;
    builder
        .set_serial_number(&serial)
        .map_err(crypto("Failed to set serial number"))?;
    let name = build_name(subject)?;
    builder
        .set_subject_name(&name)
        .map_err(crypto("Failed to set subject"))?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .map_err(crypto("Failed to set issuer from intermediate CA"))?;
    set_validity(&mut builder, validity)?;
    builder
        .set_pubkey(leaf_key)
        .map_err(crypto("Failed to set public key"))?;

    let basic_constraints = BasicConstraints::new()
        .critical()
        .build()
        .map_err(crypto("Failed to build BasicConstraints"))?;
    builder
        .append_extension(basic_constraints)
        .map_err(crypto("Failed to add BasicConstraints"))?;

    if !policy.key_usage.is_empty() {
        let mut ku = KeyUsage::new();
        ku.critical();
        for usage in &policy.key_usage {
            match usage {
                hierarchy::KeyUsage::DigitalSignature => ku.digital_signature(),
                hierarchy::KeyUsage::NonRepudiation => ku.non_repudiation(),
                hierarchy::KeyUsage::KeyEncipherment => ku.key_encipherment(),
                hierarchy::KeyUsage::DataEncipherment => ku.data_encipherment(),
                hierarchy::KeyUsage::KeyAgreement => ku.key_agreement(),
                hierarchy::KeyUsage::CertSign => ku.key_cert_sign(),
                hierarchy::KeyUsage::CrlSign => ku.crl_sign(),
            };
        }
        let extension = ku.build().map_err(crypto("Failed to build KeyUsage"))?;
        builder
            .append_extension(extension)
            .map_err(crypto("Failed to add KeyUsage"))?;
    }

    if !policy.ext_key_usage.is_empty() {
        let mut eku = ExtendedKeyUsage::new();
        for usage in &policy.ext_key_usage {
            match usage {
                ExtKeyUsage::ServerAuth => eku.server_auth(),
                ExtKeyUsage::ClientAuth => eku.client_auth(),
                ExtKeyUsage::CodeSigning => eku.code_signing(),
                ExtKeyUsage::EmailProtection => eku.email_protection(),
                ExtKeyUsage::DocumentSigning => eku.other(hierarchy::DOCUMENT_SIGNING_OID),
            };
        }
        let extension = eku
            .build()
            .map_err(crypto("Failed to build ExtendedKeyUsage"))?;
        builder
            .append_extension(extension)
            .map_err(crypto("Failed to add ExtendedKeyUsage"))?;
    }

    if let Some(email) = &subject.email {
        let san = {
            let context = builder.x509v3_context(Some(ca_cert), None);
            SubjectAlternativeName::new()
                .email(email)
                .build(&context)
                .map_err(crypto("Failed to build SubjectAlternativeName"))?
        };
        builder
            .append_extension(san)
            .map_err(crypto("Failed to add SubjectAlternativeName"))?;
    }

    builder
        .sign(ca_key, MessageDigest::sha256())
        .map_err(crypto("Failed to sign certificate"))?;
    Ok(builder.build())
}

fn set_validity(builder: &mut openssl::x509::X509Builder, validity: Validity) -> Result<()> {
    let not_before =
        Asn1Time::from_unix(validity.not_before).map_err(crypto("Failed to create not_before"))?;
    builder
        .set_not_before(&not_before)
        .map_err(crypto("Failed to set not_before"))?;
    let not_after =
        Asn1Time::from_unix(validity.not_after).map_err(crypto("Failed to create not_after"))?;
    builder
        .set_not_after(&not_after)
        .map_err(crypto("Failed to set not_after"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Ttl;

    fn window(secs: i64) -> Validity {
        let now = chrono::Utc::now().timestamp();
        Validity {
            not_before: now,
            not_after: now + secs,
        }
    }

    #[test]
    fn test_format_serial_pairs() {
        let bn = BigNum::from_hex_str("1A2B3").unwrap();
        let serial = bn.to_asn1_integer().unwrap();
        assert_eq!(format_serial(&serial).unwrap(), "01:a2:b3");
    }

    #[test]
    fn test_chain_signs_and_verifies() {
        let root_key = generate_private_key(&KeySpec::rsa(2048)).unwrap();
        let root = self_signed_root(&root_key, "Test Root CA", window(86_400)).unwrap();

        let int_key = generate_private_key(&KeySpec::rsa(2048)).unwrap();
        let csr = build_ca_csr(&int_key, "Test Intermediate CA").unwrap();
        let intermediate = sign_ca_csr(&root_key, &root, &csr, window(3_600), true).unwrap();
        assert!(intermediate.verify(&root_key).unwrap());
        assert_eq!(path_length(&root).unwrap(), Some(ROOT_CA_PATH_LENGTH));
        assert_eq!(path_length(&intermediate).unwrap(), Some(INTERMEDIATE_CA_PATH_LENGTH));

        let leaf_key = generate_private_key(&KeySpec::rsa(2048)).unwrap();
        let subject = SubjectFields::new("bob@example.com").email("bob@example.com");
        let leaf = sign_leaf(
            &int_key,
            &intermediate,
            &subject,
            &leaf_key,
            &RolePolicy::leaf(Ttl::hours(8760)),
            window(600),
        )
        .unwrap();
        assert!(leaf.verify(&int_key).unwrap());
        assert_eq!(path_length(&leaf).unwrap(), None);
        let validity = asn1_to_unix(leaf.not_after()).unwrap() - asn1_to_unix(leaf.not_before()).unwrap();
        assert_eq!(validity, 600);
    }
}
