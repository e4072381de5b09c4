//! In-process Signing Backend
//!
//! Implements [`SigningBackend`] with openssl and a mutex-guarded map of
//! namespaces. It follows the semantics of a Vault PKI mount closely enough to
//! run the whole lifecycle offline:
//! - keys are generated inside the namespace and never exported (except leaf
//!   keys, which are handed back once at issuance)
//! - sign-intermediate requests are refused when the requested TTL exceeds the
//!   parent's CA-signing role (or mount max TTL), outlives the parent, or the
//!   parent's basic constraints carry pathlen 0
//! - leaf TTLs are clamped to the role max and to the issuing CA's remaining
//!   lifetime
//! - every revocation rebuilds the namespace's CRL
//!
//! CRLs are serde documents signed with the namespace's CA key and armored as
//! PEM, since openssl offers no CRL builder. The document already carries its
//! entries, so no parsing is needed on read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::{X509Req, X509};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::{
    CrlDocument, CrlEntry, CrossSignParams, EngineType, GenerateCsrParams, GenerateRootParams,
    GeneratedCa, IssuedCredential, SigningBackend, StoredCertificate,
};
use crate::certificate_builder::{self, Validity};
use crate::error::{BackendError, BackendResult, PkiError};
use crate::hierarchy::{KeySpec, RolePolicy, Ttl, UrlSet};
use crate::key_material::KeyMaterial;
use crate::requests::SubjectFields;

const CRL_PEM_LABEL: &str = "SIGNED CRL";

fn internal(err: PkiError) -> BackendError {
    BackendError::Malformed(err.to_string())
}

fn pem_string(pem: Vec<u8>) -> BackendResult<String> {
    String::from_utf8(pem).map_err(|e| BackendError::Malformed(e.to_string()))
}

struct CaState {
    key: PKey<Private>,
    cert: X509,
    issuer_id: String,
    serial_number: String,
    not_after: i64,
    path_len: Option<u32>,
}

struct CertEntry {
    certificate_pem: String,
    revocation_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Mount {
    max_ttl: Option<Ttl>,
    ca: Option<CaState>,
    pending_key: Option<PKey<Private>>,
    roles: HashMap<String, RolePolicy>,
    certs: BTreeMap<String, CertEntry>,
    urls: UrlSet,
    default_issuer: Option<String>,
    crl: Option<CrlDocument>,
}

impl Mount {
    fn ca(&self, path: &str) -> BackendResult<&CaState> {
        self.ca
            .as_ref()
            .ok_or_else(|| BackendError::NotFound(format!("{path} has no CA certificate")))
    }

    /// Cap for subordinate CA lifetimes: the CA-signing role, else the mount max.
    fn child_ttl_cap(&self) -> Option<Ttl> {
        self.roles
            .values()
            .find(|policy| policy.ca_signing)
            .map(|policy| policy.max_ttl)
            .or(self.max_ttl)
    }
}

#[derive(Serialize)]
struct RevokedSerial<'a> {
    serial_number: &'a str,
    revocation_time: DateTime<Utc>,
}

#[derive(Serialize)]
struct CrlBody<'a> {
    issuer: &'a str,
    this_update: DateTime<Utc>,
    revoked: Vec<RevokedSerial<'a>>,
}

#[derive(Serialize)]
struct SignedCrl<'a> {
    #[serde(flatten)]
    body: &'a CrlBody<'a>,
    signature: String,
}

/// Openssl-backed backend holding all namespaces in memory.
pub struct MemoryBackend {
    mounts: Mutex<HashMap<String, Mount>>,
    leaf_key_spec: KeySpec,
    crl_enabled: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            mounts: Mutex::new(HashMap::new()),
            leaf_key_spec: KeySpec::rsa(2048),
            crl_enabled: true,
        }
    }

    /// Key type and size for leaf keys generated at issuance.
    pub fn with_leaf_key_spec(mut self, spec: KeySpec) -> Self {
        self.leaf_key_spec = spec;
        self
    }

    /// Behave like a backend without CRL support.
    pub fn without_crl(mut self) -> Self {
        self.crl_enabled = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, HashMap<String, Mount>> {
        self.mounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mount<'a>(
        state: &'a mut HashMap<String, Mount>,
        path: &str,
    ) -> BackendResult<&'a mut Mount> {
        state
            .get_mut(path)
            .ok_or_else(|| BackendError::NotFound(format!("no namespace mounted at {path}")))
    }

    fn issuer_id(cert: &X509) -> BackendResult<String> {
        let der = cert.to_der().map_err(|e| internal(e.into()))?;
        let digest = Sha256::digest(&der);
        Ok(digest[..16].iter().map(|b| format!("{b:02x}")).collect())
    }

    fn ca_state(key: PKey<Private>, cert: X509) -> BackendResult<CaState> {
        let issuer_id = Self::issuer_id(&cert)?;
        let serial_number = certificate_builder::format_serial(cert.serial_number()).map_err(internal)?;
        let not_after = certificate_builder::asn1_to_unix(cert.not_after()).map_err(internal)?;
        let path_len = certificate_builder::path_length(&cert).map_err(internal)?;
        Ok(CaState {
            key,
            cert,
            issuer_id,
            serial_number,
            not_after,
            path_len,
        })
    }

    fn build_crl(ca: &CaState, certs: &BTreeMap<String, CertEntry>) -> BackendResult<CrlDocument> {
        let issuer = ca.issuer_id.as_str();
        let revoked: Vec<RevokedSerial<'_>> = certs
            .iter()
            .filter_map(|(serial, entry)| {
                entry.revocation_time.map(|revocation_time| RevokedSerial {
                    serial_number: serial,
                    revocation_time,
                })
            })
            .collect();
        let entries = revoked
            .iter()
            .map(|r| CrlEntry {
                serial_number: r.serial_number.to_string(),
                revocation_time: r.revocation_time,
            })
            .collect();
        let body = CrlBody {
            issuer,
            this_update: Utc::now(),
            revoked,
        };
        let body_bytes =
            serde_json::to_vec(&body).map_err(|e| BackendError::Malformed(e.to_string()))?;

        let mut signer = Signer::new(MessageDigest::sha256(), &ca.key)
            .map_err(|e| internal(e.into()))?;
        let signature = signer
            .sign_oneshot_to_vec(&body_bytes)
            .map_err(|e| internal(e.into()))?;

        let document = serde_json::to_vec(&SignedCrl {
            body: &body,
            signature: STANDARD.encode(signature),
        })
        .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let raw = format!(
            "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
            STANDARD.encode(document),
            label = CRL_PEM_LABEL
        );
        Ok(CrlDocument {
            raw: raw.into_bytes(),
            entries,
        })
    }

    fn rebuild_crl(&self, mount: &mut Mount, path: &str) -> BackendResult<()> {
        if !self.crl_enabled {
            return Ok(());
        }
        let crl = Self::build_crl(mount.ca(path)?, &mount.certs)?;
        mount.crl = Some(crl);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn enable_namespace(&self, path: &str, engine: EngineType) -> BackendResult<()> {
        let mut state = self.state();
        if state.contains_key(path) {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        state.insert(path.to_string(), Mount::default());
        debug!(path = %path, engine = engine.as_str(), "Mounted namespace");
        Ok(())
    }

    fn tune(&self, path: &str, max_ttl: &Ttl) -> BackendResult<()> {
        let mut state = self.state();
        Self::mount(&mut state, path)?.max_ttl = Some(*max_ttl);
        debug!(path = %path, max_ttl = %max_ttl, "Tuned namespace");
        Ok(())
    }

    fn generate_root(&self, path: &str, params: &GenerateRootParams) -> BackendResult<GeneratedCa> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        if mount.ca.is_some() {
            return Err(BackendError::AlreadyExists(format!("{path} already holds a CA")));
        }

        let mut ttl_secs = params.ttl.as_secs();
        if let Some(max) = mount.max_ttl {
            ttl_secs = ttl_secs.min(max.as_secs());
        }
        let now = Utc::now().timestamp();
        let validity = Validity {
            not_before: now,
            not_after: now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
        };

        let key = certificate_builder::generate_private_key(&params.key_spec).map_err(internal)?;
        let cert = certificate_builder::self_signed_root(&key, &params.common_name, validity)
            .map_err(internal)?;
        let certificate_pem = pem_string(cert.to_pem().map_err(|e| internal(e.into()))?)?;
        let ca = Self::ca_state(key, cert)?;
        let generated = GeneratedCa {
            certificate_pem: certificate_pem.clone(),
            issuer_id: ca.issuer_id.clone(),
            serial_number: ca.serial_number.clone(),
        };

        mount.certs.insert(
            ca.serial_number.clone(),
            CertEntry {
                certificate_pem,
                revocation_time: None,
            },
        );
        mount.default_issuer = Some(ca.issuer_id.clone());
        mount.ca = Some(ca);
        self.rebuild_crl(mount, path)?;

        debug!(path = %path, issuer_name = %params.issuer_name, "Generated root CA");
        Ok(generated)
    }

    fn generate_csr(&self, path: &str, params: &GenerateCsrParams) -> BackendResult<String> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;

        let key = certificate_builder::generate_private_key(&params.key_spec).map_err(internal)?;
        let csr = certificate_builder::build_ca_csr(&key, &params.common_name).map_err(internal)?;
        let csr_pem = pem_string(csr.to_pem().map_err(|e| internal(e.into()))?)?;
        mount.pending_key = Some(key);

        debug!(path = %path, issuer_name = %params.issuer_name, "Generated intermediate CSR");
        Ok(csr_pem)
    }

    fn cross_sign(&self, parent_path: &str, params: &CrossSignParams) -> BackendResult<String> {
        let mut state = self.state();
        let parent = Self::mount(&mut state, parent_path)?;
        let csr = X509Req::from_pem(params.csr_pem.as_bytes())
            .map_err(|e| BackendError::Rejected(format!("invalid CSR: {e}")))?;

        if let Some(cap) = parent.child_ttl_cap() {
            if params.ttl.as_secs() > cap.as_secs() {
                return Err(BackendError::Rejected(format!(
                    "requested TTL {} exceeds the maximum {} allowed by {parent_path}",
                    params.ttl, cap
                )));
            }
        }

        let ca = parent.ca(parent_path)?;
        if ca.path_len == Some(0) {
            return Err(BackendError::Rejected(format!(
                "CA at {parent_path} has pathlen 0 and may not sign subordinate CAs"
            )));
        }
        let now = Utc::now().timestamp();
        let not_after = now.saturating_add(i64::try_from(params.ttl.as_secs()).unwrap_or(i64::MAX));
        if not_after > ca.not_after {
            return Err(BackendError::Rejected(format!(
                "requested TTL {} would outlive the issuing CA at {parent_path}",
                params.ttl
            )));
        }

        let cert = certificate_builder::sign_ca_csr(
            &ca.key,
            &ca.cert,
            &csr,
            Validity {
                not_before: now,
                not_after,
            },
            params.use_csr_values,
        )
        .map_err(|e| BackendError::Rejected(e.to_string()))?;
        let serial = certificate_builder::format_serial(cert.serial_number()).map_err(internal)?;
        let certificate_pem = pem_string(cert.to_pem().map_err(|e| internal(e.into()))?)?;
        let issuing_pem = pem_string(ca.cert.to_pem().map_err(|e| internal(e.into()))?)?;

        parent.certs.insert(
            serial.clone(),
            CertEntry {
                certificate_pem: certificate_pem.clone(),
                revocation_time: None,
            },
        );
        debug!(parent_path = %parent_path, serial = %serial, ttl = %params.ttl, "Signed intermediate CSR");
        Ok(format!("{certificate_pem}{issuing_pem}"))
    }

    fn set_signed(&self, path: &str, certificate_pem: &str) -> BackendResult<Vec<String>> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;

        let cert = X509::stack_from_pem(certificate_pem.as_bytes())
            .map_err(|e| BackendError::Rejected(format!("invalid certificate bundle: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Rejected("empty certificate bundle".to_string()))?;
        let key = mount
            .pending_key
            .take()
            .ok_or_else(|| BackendError::Rejected(format!("{path} has no pending CSR key")))?;

        let public = cert.public_key().map_err(|e| internal(e.into()))?;
        if !public.public_eq(&key) {
            mount.pending_key = Some(key);
            return Err(BackendError::Rejected(
                "certificate does not match the pending key".to_string(),
            ));
        }

        let ca = Self::ca_state(key, cert)?;
        let issuer_id = ca.issuer_id.clone();
        if mount.default_issuer.is_none() {
            mount.default_issuer = Some(issuer_id.clone());
        }
        mount.ca = Some(ca);
        self.rebuild_crl(mount, path)?;

        debug!(path = %path, issuer_id = %issuer_id, "Installed signed intermediate");
        Ok(vec![issuer_id])
    }

    fn configure_urls(&self, path: &str, urls: &UrlSet) -> BackendResult<()> {
        let mut state = self.state();
        Self::mount(&mut state, path)?.urls = urls.clone();
        debug!(path = %path, "Configured URLs");
        Ok(())
    }

    fn set_default_issuer(&self, path: &str, issuer_id: &str) -> BackendResult<()> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        if mount.ca(path)?.issuer_id != issuer_id {
            return Err(BackendError::NotFound(format!("issuer {issuer_id} in {path}")));
        }
        mount.default_issuer = Some(issuer_id.to_string());
        Ok(())
    }

    fn create_role(&self, path: &str, role_id: &str, policy: &RolePolicy) -> BackendResult<()> {
        let mut state = self.state();
        Self::mount(&mut state, path)?
            .roles
            .insert(role_id.to_string(), policy.clone());
        debug!(path = %path, role = %role_id, max_ttl = %policy.max_ttl, "Wrote role");
        Ok(())
    }

    fn issue(
        &self,
        path: &str,
        role_id: &str,
        subject: &SubjectFields,
        ttl: &Ttl,
    ) -> BackendResult<IssuedCredential> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        let policy = mount
            .roles
            .get(role_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("role {role_id} in {path}")))?;
        if subject.common_name.trim().is_empty() {
            return Err(BackendError::Rejected("common_name is required".to_string()));
        }

        let mut ttl_secs = if ttl.is_zero() {
            policy.max_ttl.as_secs()
        } else {
            ttl.as_secs().min(policy.max_ttl.as_secs())
        };
        if let Some(max) = mount.max_ttl {
            ttl_secs = ttl_secs.min(max.as_secs());
        }

        let ca = mount.ca(path)?;
        let not_before = Utc::now().timestamp();
        let remaining = ca.not_after - not_before;
        if remaining <= 0 {
            return Err(BackendError::Rejected(format!("issuing CA at {path} has expired")));
        }
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(remaining);
        let validity = Validity {
            not_before,
            not_after: not_before + ttl_secs,
        };

        let leaf_key =
            certificate_builder::generate_private_key(&self.leaf_key_spec).map_err(internal)?;
        let cert = certificate_builder::sign_leaf(&ca.key, &ca.cert, subject, &leaf_key, &policy, validity)
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        let serial_number =
            certificate_builder::format_serial(cert.serial_number()).map_err(internal)?;
        let certificate_pem = pem_string(cert.to_pem().map_err(|e| internal(e.into()))?)?;
        let key_pem = pem_string(
            leaf_key
                .private_key_to_pem_pkcs8()
                .map_err(|e| internal(e.into()))?,
        )?;
        let expiration = DateTime::from_timestamp(validity.not_after, 0)
            .ok_or_else(|| BackendError::Malformed("expiration out of range".to_string()))?;

        mount.certs.insert(
            serial_number.clone(),
            CertEntry {
                certificate_pem: certificate_pem.clone(),
                revocation_time: None,
            },
        );
        debug!(path = %path, role = %role_id, serial = %serial_number, "Issued certificate");
        Ok(IssuedCredential {
            certificate_pem,
            private_key: KeyMaterial::plain(key_pem),
            serial_number,
            expiration,
        })
    }

    fn list_certs(&self, path: &str) -> BackendResult<Vec<String>> {
        let mut state = self.state();
        Ok(Self::mount(&mut state, path)?.certs.keys().cloned().collect())
    }

    fn read_cert(&self, path: &str, serial: &str) -> BackendResult<StoredCertificate> {
        let mut state = self.state();
        let entry = Self::mount(&mut state, path)?
            .certs
            .get(serial)
            .ok_or_else(|| BackendError::NotFound(format!("certificate {serial} in {path}")))?;
        Ok(StoredCertificate {
            serial_number: serial.to_string(),
            certificate_pem: entry.certificate_pem.clone(),
            revocation_time: entry.revocation_time,
        })
    }

    fn revoke(&self, path: &str, serial: &str) -> BackendResult<DateTime<Utc>> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        if mount.ca.as_ref().is_some_and(|ca| ca.serial_number == serial) {
            return Err(BackendError::Rejected(
                "revoking the namespace's own CA certificate is not allowed".to_string(),
            ));
        }
        let entry = mount
            .certs
            .get_mut(serial)
            .ok_or_else(|| BackendError::NotFound(format!("certificate {serial} in {path}")))?;
        let revoked_at = *entry.revocation_time.get_or_insert_with(Utc::now);
        self.rebuild_crl(mount, path)?;
        debug!(path = %path, serial = %serial, "Revoked certificate");
        Ok(revoked_at)
    }

    fn rotate_crl(&self, path: &str) -> BackendResult<()> {
        if !self.crl_enabled {
            return Err(BackendError::Unsupported(format!("CRL building is disabled for {path}")));
        }
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        self.rebuild_crl(mount, path)
    }

    fn read_crl(&self, path: &str) -> BackendResult<Option<CrlDocument>> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        if !self.crl_enabled {
            return Ok(None);
        }
        Ok(mount.crl.clone())
    }

    fn read_ca_certificate(&self, path: &str) -> BackendResult<String> {
        let mut state = self.state();
        let mount = Self::mount(&mut state, path)?;
        pem_string(mount.ca(path)?.cert.to_pem().map_err(|e| internal(e.into()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_params(ttl: Ttl) -> GenerateRootParams {
        GenerateRootParams {
            common_name: "Test Root CA".to_string(),
            issuer_name: "test-root".to_string(),
            key_spec: KeySpec::rsa(2048),
            ttl,
        }
    }

    fn backend_with_root(ttl: Ttl) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.enable_namespace("pki/root/t/c", EngineType::Pki).unwrap();
        backend.generate_root("pki/root/t/c", &root_params(ttl)).unwrap();
        backend
    }

    #[test]
    fn test_enable_twice_is_already_exists() {
        let backend = MemoryBackend::new();
        backend.enable_namespace("pki/root/a/b", EngineType::Pki).unwrap();
        let err = backend.enable_namespace("pki/root/a/b", EngineType::Pki).unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
    }

    #[test]
    fn test_cross_sign_rejects_ttl_over_role_cap() {
        let backend = backend_with_root(Ttl::hours(100));
        backend
            .create_role("pki/root/t/c", "signer", &RolePolicy::child_signing(Ttl::hours(50)))
            .unwrap();
        backend.enable_namespace("pki/int/t/c", EngineType::Pki).unwrap();
        let csr = backend
            .generate_csr(
                "pki/int/t/c",
                &GenerateCsrParams {
                    common_name: "Test Intermediate CA".to_string(),
                    issuer_name: "test-int".to_string(),
                    key_spec: KeySpec::rsa(2048),
                },
            )
            .unwrap();
        let err = backend
            .cross_sign(
                "pki/root/t/c",
                &CrossSignParams {
                    csr_pem: csr.clone(),
                    ttl: Ttl::hours(60),
                    use_csr_values: true,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));

        let bundle = backend
            .cross_sign(
                "pki/root/t/c",
                &CrossSignParams {
                    csr_pem: csr,
                    ttl: Ttl::hours(50),
                    use_csr_values: true,
                },
            )
            .unwrap();
        let ids = backend.set_signed("pki/int/t/c", &bundle).unwrap();
        assert_eq!(ids.len(), 1);
        backend.set_default_issuer("pki/int/t/c", &ids[0]).unwrap();
    }

    #[test]
    fn test_intermediate_cannot_sign_subordinate_ca() {
        let backend = backend_with_root(Ttl::hours(100));
        let csr_params = |cn: &str| GenerateCsrParams {
            common_name: cn.to_string(),
            issuer_name: cn.to_string(),
            key_spec: KeySpec::rsa(2048),
        };
        backend.enable_namespace("pki/int/t/c", EngineType::Pki).unwrap();
        let csr = backend.generate_csr("pki/int/t/c", &csr_params("int")).unwrap();
        let bundle = backend
            .cross_sign(
                "pki/root/t/c",
                &CrossSignParams {
                    csr_pem: csr,
                    ttl: Ttl::hours(50),
                    use_csr_values: true,
                },
            )
            .unwrap();
        backend.set_signed("pki/int/t/c", &bundle).unwrap();

        backend.enable_namespace("pki/int/t/c/sub", EngineType::Pki).unwrap();
        let csr = backend.generate_csr("pki/int/t/c/sub", &csr_params("sub")).unwrap();
        let err = backend
            .cross_sign(
                "pki/int/t/c",
                &CrossSignParams {
                    csr_pem: csr,
                    ttl: Ttl::hours(10),
                    use_csr_values: true,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(reason) if reason.contains("pathlen 0")));
    }

    #[test]
    fn test_issue_clamps_to_role_max() {
        let backend = backend_with_root(Ttl::hours(100));
        backend
            .create_role("pki/root/t/c", "leaf", &RolePolicy::leaf(Ttl::hours(2)))
            .unwrap();
        let issued = backend
            .issue("pki/root/t/c", "leaf", &SubjectFields::new("alice"), &Ttl::hours(10))
            .unwrap();
        let cert = X509::from_pem(issued.certificate_pem.as_bytes()).unwrap();
        let lifetime = certificate_builder::asn1_to_unix(cert.not_after()).unwrap()
            - certificate_builder::asn1_to_unix(cert.not_before()).unwrap();
        assert_eq!(lifetime, 2 * 3600);
        assert!(!issued.private_key.is_encrypted());
    }

    #[test]
    fn test_revoke_keeps_first_time_and_updates_crl() {
        let backend = backend_with_root(Ttl::hours(100));
        backend
            .create_role("pki/root/t/c", "leaf", &RolePolicy::leaf(Ttl::hours(2)))
            .unwrap();
        let issued = backend
            .issue("pki/root/t/c", "leaf", &SubjectFields::new("bob"), &Ttl::hours(1))
            .unwrap();
        let first = backend.revoke("pki/root/t/c", &issued.serial_number).unwrap();
        let second = backend.revoke("pki/root/t/c", &issued.serial_number).unwrap();
        assert_eq!(first, second);

        let crl = backend.read_crl("pki/root/t/c").unwrap().unwrap();
        assert_eq!(crl.entries.len(), 1);
        assert_eq!(crl.entries[0].serial_number, issued.serial_number);
        assert!(String::from_utf8(crl.raw).unwrap().starts_with("-----BEGIN SIGNED CRL-----"));
    }

    #[test]
    fn test_crl_disabled() {
        let backend = MemoryBackend::new().without_crl();
        backend.enable_namespace("pki/root/t/c", EngineType::Pki).unwrap();
        backend.generate_root("pki/root/t/c", &root_params(Ttl::hours(10))).unwrap();
        assert!(matches!(
            backend.rotate_crl("pki/root/t/c"),
            Err(BackendError::Unsupported(_))
        ));
        assert!(backend.read_crl("pki/root/t/c").unwrap().is_none());
    }
}
