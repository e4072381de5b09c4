//! Crypto Provider
//!
//! Encoding-level operations the core needs on certificates, keys and CRLs:
//! - parse a PEM certificate into subject, serial, validity and key usage
//! - encrypt / decrypt a PEM private key with a password (PKCS#8, AES-256-CBC)
//! - pack a certificate, key and CA chain into a PKCS#12 bundle
//! - parse an X.509 CRL into (serial, revocation time) entries
//!
//! [`OpensslProvider`] implements all of it on top of the `openssl` crate.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1TimeRef;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::{X509Crl, X509};
use secrecy::{ExposeSecret, SecretString};

use crate::backend::CrlEntry;
use crate::certificate_builder::{asn1_to_unix, format_serial};
use crate::error::{PkiError, Result};
use crate::hierarchy::KeyUsage;
use crate::key_material::KeyMaterial;

/// Fields of a certificate the ledger cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub subject_common_name: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_usage: BTreeSet<KeyUsage>,
}

pub trait CryptoProvider: Send + Sync {
    fn parse_certificate(&self, pem: &str) -> Result<ParsedCertificate>;

    /// Encrypt a plaintext PEM key under `password`.
    fn encrypt_key(&self, key: &KeyMaterial, password: &SecretString) -> Result<KeyMaterial>;

    /// Decrypt an encrypted PEM key back to plaintext PKCS#8.
    fn decrypt_key(&self, key: &KeyMaterial, password: &SecretString) -> Result<KeyMaterial>;

    /// DER-encoded PKCS#12 bundle. `key` must be plaintext.
    fn pack_pkcs12(
        &self,
        friendly_name: &str,
        certificate_pem: &str,
        key: &KeyMaterial,
        chain_pems: &[String],
        password: &SecretString,
    ) -> Result<Vec<u8>>;

    /// Entries of a PEM or DER encoded X.509 CRL.
    fn parse_crl(&self, raw: &[u8]) -> Result<Vec<CrlEntry>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpensslProvider;

impl OpensslProvider {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>> {
    let secs = asn1_to_unix(time)?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| PkiError::Crypto(format!("timestamp {secs} out of range")))
}

/// Key usage flags as printed in openssl's text dump of the certificate.
fn key_usage_from_text(text: &str) -> BTreeSet<KeyUsage> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        if line.trim_start().starts_with("X509v3 Key Usage") {
            return lines
                .next()
                .map(|usages| usages.split(',').filter_map(KeyUsage::from_label).collect())
                .unwrap_or_default();
        }
    }
    BTreeSet::new()
}

impl CryptoProvider for OpensslProvider {
    fn parse_certificate(&self, pem: &str) -> Result<ParsedCertificate> {
        let cert = X509::from_pem(pem.as_bytes())
            .map_err(|e| PkiError::Crypto(format!("Failed to parse certificate: {}", e)))?;

        let subject_common_name = cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string())
            .unwrap_or_default();

        let text = cert
            .to_text()
            .map_err(|e| PkiError::Crypto(format!("Failed to render certificate: {}", e)))?;

        Ok(ParsedCertificate {
            subject_common_name,
            serial_number: format_serial(cert.serial_number())?,
            not_before: to_datetime(cert.not_before())?,
            not_after: to_datetime(cert.not_after())?,
            key_usage: key_usage_from_text(&String::from_utf8_lossy(&text)),
        })
    }

    fn encrypt_key(&self, key: &KeyMaterial, password: &SecretString) -> Result<KeyMaterial> {
        if key.is_encrypted() {
            return Err(PkiError::Crypto("private key is already encrypted".to_string()));
        }
        let pkey = PKey::private_key_from_pem(key.expose_pem().as_bytes())
            .map_err(|e| PkiError::Crypto(format!("Failed to load private key: {}", e)))?;
        let encrypted = pkey
            .private_key_to_pem_pkcs8_passphrase(
                Cipher::aes_256_cbc(),
                password.expose_secret().as_bytes(),
            )
            .map_err(|e| PkiError::Crypto(format!("Failed to encrypt private key: {}", e)))?;
        let pem = String::from_utf8(encrypted)
            .map_err(|e| PkiError::Crypto(format!("Encrypted key is not UTF-8: {}", e)))?;
        Ok(KeyMaterial::encrypted(pem))
    }

    fn decrypt_key(&self, key: &KeyMaterial, password: &SecretString) -> Result<KeyMaterial> {
        let pkey = PKey::private_key_from_pem_passphrase(
            key.expose_pem().as_bytes(),
            password.expose_secret().as_bytes(),
        )
        .map_err(|e| PkiError::Crypto(format!("Failed to decrypt private key: {}", e)))?;
        let plain = pkey
            .private_key_to_pem_pkcs8()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode private key: {}", e)))?;
        let pem = String::from_utf8(plain)
            .map_err(|e| PkiError::Crypto(format!("Private key is not UTF-8: {}", e)))?;
        Ok(KeyMaterial::plain(pem))
    }

    fn pack_pkcs12(
        &self,
        friendly_name: &str,
        certificate_pem: &str,
        key: &KeyMaterial,
        chain_pems: &[String],
        password: &SecretString,
    ) -> Result<Vec<u8>> {
        if key.is_encrypted() {
            return Err(PkiError::Crypto(
                "private key must be decrypted before packing".to_string(),
            ));
        }
        let cert = X509::from_pem(certificate_pem.as_bytes())
            .map_err(|e| PkiError::Crypto(format!("Failed to parse certificate: {}", e)))?;
        let pkey = PKey::private_key_from_pem(key.expose_pem().as_bytes())
            .map_err(|e| PkiError::Crypto(format!("Failed to load private key: {}", e)))?;

        let mut chain = Stack::new()?;
        for pem in chain_pems {
            for ca in X509::stack_from_pem(pem.as_bytes())
                .map_err(|e| PkiError::Crypto(format!("Failed to parse CA chain: {}", e)))?
            {
                chain.push(ca)?;
            }
        }

        let mut builder = Pkcs12::builder();
        builder.name(friendly_name).pkey(&pkey).cert(&cert);
        if !chain.is_empty() {
            builder.ca(chain);
        }
        let pkcs12 = builder
            .build2(password.expose_secret())
            .map_err(|e| PkiError::Crypto(format!("Failed to build PKCS#12 bundle: {}", e)))?;
        pkcs12
            .to_der()
            .map_err(|e| PkiError::Crypto(format!("Failed to encode PKCS#12 bundle: {}", e)))
    }

    fn parse_crl(&self, raw: &[u8]) -> Result<Vec<CrlEntry>> {
        let crl = if raw.starts_with(b"-----BEGIN") {
            X509Crl::from_pem(raw)
        } else {
            X509Crl::from_der(raw)
        }
        .map_err(|e| PkiError::Crypto(format!("Failed to parse CRL: {}", e)))?;

        let mut entries = Vec::new();
        if let Some(revoked) = crl.get_revoked() {
            for entry in revoked {
                entries.push(CrlEntry {
                    serial_number: format_serial(entry.serial_number())?,
                    revocation_time: to_datetime(entry.revocation_date())?,
                });
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate_builder::{generate_private_key, self_signed_root, Validity};
    use crate::hierarchy::KeySpec;

    fn root_pem() -> (String, KeyMaterial) {
        let key = generate_private_key(&KeySpec::rsa(2048)).unwrap();
        let now = Utc::now().timestamp();
        let cert = self_signed_root(
            &key,
            "Parse Test CA",
            Validity {
                not_before: now,
                not_after: now + 3_600,
            },
        )
        .unwrap();
        let cert_pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
        let key_pem = String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap();
        (cert_pem, KeyMaterial::plain(key_pem))
    }

    #[test]
    fn test_parse_certificate_fields() {
        let (cert_pem, _) = root_pem();
        let parsed = OpensslProvider.parse_certificate(&cert_pem).unwrap();
        assert_eq!(parsed.subject_common_name, "Parse Test CA");
        assert_eq!((parsed.not_after - parsed.not_before).num_seconds(), 3_600);
        assert!(parsed.key_usage.contains(&KeyUsage::CertSign));
        assert!(parsed.key_usage.contains(&KeyUsage::CrlSign));
        assert!(parsed.serial_number.contains(':'));
    }

    #[test]
    fn test_encrypt_then_decrypt_key() {
        let (_, key) = root_pem();
        let password = SecretString::from("secret123".to_string());
        let encrypted = OpensslProvider.encrypt_key(&key, &password).unwrap();
        assert!(encrypted.is_encrypted());
        assert!(encrypted.expose_pem().contains("BEGIN ENCRYPTED PRIVATE KEY"));

        let wrong = SecretString::from("wrong".to_string());
        assert!(OpensslProvider.decrypt_key(&encrypted, &wrong).is_err());
        let decrypted = OpensslProvider.decrypt_key(&encrypted, &password).unwrap();
        assert!(!decrypted.is_encrypted());
    }

    #[test]
    fn test_pack_pkcs12_parses_back() {
        let (cert_pem, key) = root_pem();
        let password = SecretString::from("bundle".to_string());
        let der = OpensslProvider
            .pack_pkcs12("Parse Test CA", &cert_pem, &key, &[], &password)
            .unwrap();
        let parsed = Pkcs12::from_der(&der).unwrap().parse2("bundle").unwrap();
        assert!(parsed.cert.is_some());
        assert!(parsed.pkey.is_some());
    }
}
