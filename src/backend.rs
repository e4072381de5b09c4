//! Signing Backend capability
//!
//! The backend is a path-namespaced authority that holds CA private keys and
//! signs, issues and revokes on request. The core treats it as remote state:
//! every method is one individually atomic call, and nothing returned here is
//! cached across operations.
//!
//! Two implementations ship with the crate:
//! - [`VaultBackend`](crate::vault_backend::VaultBackend): HTTP adapter for a
//!   Vault-compatible PKI secrets engine
//! - [`MemoryBackend`](crate::memory_backend::MemoryBackend): in-process,
//!   openssl-backed authority for tests and offline use

use chrono::{DateTime, Utc};

use crate::error::BackendResult;
use crate::hierarchy::{KeySpec, RolePolicy, Ttl, UrlSet};
use crate::key_material::KeyMaterial;
use crate::requests::SubjectFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    Pki,
}

impl EngineType {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineType::Pki => "pki",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRootParams {
    pub common_name: String,
    pub issuer_name: String,
    pub key_spec: KeySpec,
    pub ttl: Ttl,
}

#[derive(Debug, Clone)]
pub struct GenerateCsrParams {
    pub common_name: String,
    pub issuer_name: String,
    pub key_spec: KeySpec,
}

#[derive(Debug, Clone)]
pub struct CrossSignParams {
    pub csr_pem: String,
    pub ttl: Ttl,
    /// Honor the extensions declared by the child CSR.
    pub use_csr_values: bool,
}

/// A CA certificate produced by the backend (root generation).
#[derive(Debug, Clone)]
pub struct GeneratedCa {
    pub certificate_pem: String,
    pub issuer_id: String,
    pub serial_number: String,
}

/// Leaf certificate plus its freshly generated private key.
#[derive(Debug)]
pub struct IssuedCredential {
    pub certificate_pem: String,
    pub private_key: KeyMaterial,
    pub serial_number: String,
    pub expiration: DateTime<Utc>,
}

/// Certificate as stored by the backend.
#[derive(Debug, Clone)]
pub struct StoredCertificate {
    pub serial_number: String,
    pub certificate_pem: String,
    /// `None` when the certificate has not been revoked.
    pub revocation_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlEntry {
    pub serial_number: String,
    pub revocation_time: DateTime<Utc>,
}

/// Raw CRL bytes plus the entries they carry.
#[derive(Debug, Clone)]
pub struct CrlDocument {
    pub raw: Vec<u8>,
    pub entries: Vec<CrlEntry>,
}

pub trait SigningBackend: Send + Sync {
    /// Short identifier for log fields.
    fn name(&self) -> &'static str;

    /// Mount a new namespace; `AlreadyExists` if the path is taken.
    fn enable_namespace(&self, path: &str, engine: EngineType) -> BackendResult<()>;

    fn tune(&self, path: &str, max_ttl: &Ttl) -> BackendResult<()>;

    /// Generate a self-signed root inside the namespace. The key never leaves.
    fn generate_root(&self, path: &str, params: &GenerateRootParams) -> BackendResult<GeneratedCa>;

    /// Generate a key inside the namespace and return a CSR for it.
    fn generate_csr(&self, path: &str, params: &GenerateCsrParams) -> BackendResult<String>;

    /// Ask the CA at `parent_path` to sign a subordinate CA CSR.
    ///
    /// `Rejected` when the parent's policy refuses it.
    fn cross_sign(&self, parent_path: &str, params: &CrossSignParams) -> BackendResult<String>;

    /// Install a signed certificate; returns the issuer ids it created.
    fn set_signed(&self, path: &str, certificate_pem: &str) -> BackendResult<Vec<String>>;

    fn configure_urls(&self, path: &str, urls: &UrlSet) -> BackendResult<()>;

    fn set_default_issuer(&self, path: &str, issuer_id: &str) -> BackendResult<()>;

    fn create_role(&self, path: &str, role_id: &str, policy: &RolePolicy) -> BackendResult<()>;

    /// Issue a leaf. The backend clamps `ttl` to the role's max TTL.
    fn issue(
        &self,
        path: &str,
        role_id: &str,
        subject: &SubjectFields,
        ttl: &Ttl,
    ) -> BackendResult<IssuedCredential>;

    fn list_certs(&self, path: &str) -> BackendResult<Vec<String>>;

    fn read_cert(&self, path: &str, serial: &str) -> BackendResult<StoredCertificate>;

    /// Revoke; returns the recorded revocation time. Revoking twice keeps the
    /// first time.
    fn revoke(&self, path: &str, serial: &str) -> BackendResult<DateTime<Utc>>;

    /// Force regeneration of the namespace's CRL.
    fn rotate_crl(&self, path: &str) -> BackendResult<()>;

    /// Current CRL, or `None` when CRLs are unsupported, disabled, or the
    /// backend has produced no document.
    fn read_crl(&self, path: &str) -> BackendResult<Option<CrlDocument>>;

    /// PEM of the namespace's current CA certificate.
    fn read_ca_certificate(&self, path: &str) -> BackendResult<String>;
}
