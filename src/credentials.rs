//! Credential Export Manager
//!
//! Persists issued leaf credentials to the artifact layout and packages them
//! as PKCS#12 bundles for distribution.
//!
//! # Key Protection
//!
//! ```text
//! password given, confirmation matches    → {cn}.key.enc only (PKCS#8, AES-256-CBC)
//! password given, confirmation mismatches → {cn}.key plaintext + PasswordMismatch warning
//! no password                             → {cn}.key plaintext
//! ```
//!
//! Credentials are addressed by sanitized common name, so `John Smith` and
//! `John_Smith` share files; persisting one over a certificate issued to the
//! other fails with [`PkiError::CredentialConflict`].
//!
//! A mismatch while persisting never loses the key: the credential is still
//! written, and the caller is told exactly why it is unprotected. A mismatch
//! on the bundle password while exporting is a hard failure.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::crypto::CryptoProvider;
use crate::error::{PkiError, Result};
use crate::hierarchy::Namespace;
use crate::key_material::{KeyEncoding, KeyMaterial, PasswordEntry};
use crate::storage::{ArtifactStore, CredentialScope};

/// Non-fatal condition reported by [`CredentialManager::persist_credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistWarning {
    /// Confirmation did not match; the key was stored unencrypted.
    PasswordMismatch { common_name: String },
}

#[derive(Debug)]
pub struct PersistOutcome {
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    pub key_encoding: KeyEncoding,
    pub warning: Option<PersistWarning>,
}

/// Certificate plus whatever key material is on disk for one common name.
#[derive(Debug)]
pub struct CredentialBundle {
    pub common_name: String,
    pub certificate_pem: String,
    pub key: Option<KeyMaterial>,
    pub pkcs12: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub bundle: CredentialBundle,
    /// Number of CA certificates included in the bundle.
    pub chain_length: usize,
}

pub struct CredentialManager {
    store: ArtifactStore,
    crypto: Arc<dyn CryptoProvider>,
}

impl CredentialManager {
    pub fn new(store: ArtifactStore, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self { store, crypto }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Write certificate and key for `common_name`, encrypting the key when a
    /// confirmed password is supplied.
    pub fn persist_credential(
        &self,
        scope: &CredentialScope,
        common_name: &str,
        certificate_pem: &str,
        key: &KeyMaterial,
        password: Option<&PasswordEntry>,
    ) -> Result<PersistOutcome> {
        self.check_collision(scope, common_name)?;
        let certificate_path = self.store.write_certificate(scope, common_name, certificate_pem)?;

        let mut warning = None;
        let (key_path, key_encoding) = match password {
            _ if key.is_encrypted() => (
                self.store.write_key(scope, common_name, key)?,
                KeyEncoding::Encrypted,
            ),
            Some(entry) if !entry.matches() => {
                warn!(
                    common_name = %common_name,
                    "Password confirmation does not match; storing private key unencrypted"
                );
                warning = Some(PersistWarning::PasswordMismatch {
                    common_name: common_name.to_string(),
                });
                (self.store.write_key(scope, common_name, key)?, KeyEncoding::Plain)
            }
            Some(entry) if !entry.is_empty() => {
                let encrypted = self.crypto.encrypt_key(key, entry.password())?;
                // Replaces any plaintext copy left from an earlier run
                (
                    self.store.write_key(scope, common_name, &encrypted)?,
                    KeyEncoding::Encrypted,
                )
            }
            _ => (self.store.write_key(scope, common_name, key)?, KeyEncoding::Plain),
        };

        info!(
            common_name = %common_name,
            certificate = %certificate_path.display(),
            key_encoding = ?key_encoding,
            "Persisted credential"
        );
        Ok(PersistOutcome {
            certificate_path,
            key_path,
            key_encoding,
            warning,
        })
    }

    /// Sanitized file names can collide; an existing certificate for another
    /// subject is never overwritten.
    fn check_collision(&self, scope: &CredentialScope, common_name: &str) -> Result<()> {
        let Some(existing_pem) = self.store.read_certificate(scope, common_name)? else {
            return Ok(());
        };
        let path = self.store.certificate_path(scope, common_name);
        match self.crypto.parse_certificate(&existing_pem) {
            Ok(existing) if existing.subject_common_name != common_name => {
                Err(PkiError::CredentialConflict {
                    path,
                    existing: existing.subject_common_name,
                    requested: common_name.to_string(),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Replacing unreadable certificate");
                Ok(())
            }
        }
    }

    /// Load what is on disk for `common_name`.
    pub fn load_bundle(&self, scope: &CredentialScope, common_name: &str) -> Result<CredentialBundle> {
        let certificate_pem = self
            .store
            .read_certificate(scope, common_name)?
            .ok_or_else(|| PkiError::NotFound {
                what: "certificate",
                target: self.store.certificate_path(scope, common_name).display().to_string(),
            })?;
        let key = self.store.read_key(scope, common_name)?;
        Ok(CredentialBundle {
            common_name: common_name.to_string(),
            certificate_pem,
            key,
            pkcs12: None,
        })
    }

    /// Package certificate and key as `{cn}.p12`.
    ///
    /// The encrypted key is used when present, otherwise the plaintext one.
    /// `key_password` is only needed for an encrypted key. When `issuer` names
    /// an intermediate whose certificate is in the artifact layout, it is added
    /// as the bundle's CA chain.
    pub fn export_pkcs12(
        &self,
        scope: &CredentialScope,
        common_name: &str,
        bundle_password: &PasswordEntry,
        key_password: Option<&SecretString>,
        issuer: Option<&Namespace>,
    ) -> Result<ExportOutcome> {
        if !bundle_password.matches() {
            return Err(PkiError::PasswordMismatch {
                common_name: common_name.to_string(),
            });
        }

        let mut bundle = self.load_bundle(scope, common_name)?;
        let key = bundle.key.as_ref().ok_or_else(|| PkiError::NotFound {
            what: "private key",
            target: self.store.key_path(scope, common_name).display().to_string(),
        })?;

        let decrypted;
        let plain = if key.is_encrypted() {
            let password = key_password.ok_or_else(|| PkiError::MissingKeyPassword {
                common_name: common_name.to_string(),
            })?;
            decrypted = self.crypto.decrypt_key(key, password)?;
            &decrypted
        } else {
            key
        };

        let chain = match issuer {
            Some(namespace) => self
                .store
                .read_intermediate_certificate(namespace)?
                .into_iter()
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };

        let der = self.crypto.pack_pkcs12(
            common_name,
            &bundle.certificate_pem,
            plain,
            &chain,
            bundle_password.password(),
        )?;
        let path = self.store.write_pkcs12(scope, common_name, &der)?;
        let chain_length: usize = chain
            .iter()
            .map(|pem| pem.matches("BEGIN CERTIFICATE").count())
            .sum();
        info!(common_name = %common_name, path = %path.display(), chain = chain_length, "Exported PKCS#12 bundle");

        bundle.pkcs12 = Some(der);
        Ok(ExportOutcome {
            path,
            bundle,
            chain_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LayoutConfig;
    use crate::crypto::OpensslProvider;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> CredentialManager {
        CredentialManager::new(
            ArtifactStore::new(LayoutConfig {
                root_cert_dir: dir.path().join("root"),
                intermediate_cert_dir: dir.path().join("int"),
                user_cert_dir: dir.path().join("users"),
            }),
            Arc::new(OpensslProvider::new()),
        )
    }

    #[test]
    fn test_export_mismatch_is_hard_failure() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let scope = CredentialScope::new("abc", Some("vendor1"));
        let err = manager
            .export_pkcs12(&scope, "alice", &PasswordEntry::new("a", "b"), None, None)
            .unwrap_err();
        assert!(matches!(err, PkiError::PasswordMismatch { .. }));
    }

    #[test]
    fn test_export_missing_certificate() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let scope = CredentialScope::new("abc", Some("vendor1"));
        let err = manager
            .export_pkcs12(&scope, "alice", &PasswordEntry::confirmed("pw"), None, None)
            .unwrap_err();
        assert!(matches!(err, PkiError::NotFound { what: "certificate", .. }));
    }

    #[test]
    fn test_export_missing_key() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let scope = CredentialScope::new("abc", Some("vendor1"));
        manager.store().write_certificate(&scope, "alice", "cert").unwrap();
        let err = manager
            .export_pkcs12(&scope, "alice", &PasswordEntry::confirmed("pw"), None, None)
            .unwrap_err();
        assert!(matches!(err, PkiError::NotFound { what: "private key", .. }));
    }

    #[test]
    fn test_encrypted_key_needs_password() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let scope = CredentialScope::new("abc", None);
        manager.store().write_certificate(&scope, "alice", "cert").unwrap();
        manager
            .store()
            .write_key(&scope, "alice", &KeyMaterial::encrypted("cipher"))
            .unwrap();
        let err = manager
            .export_pkcs12(&scope, "alice", &PasswordEntry::confirmed("pw"), None, None)
            .unwrap_err();
        assert!(matches!(err, PkiError::MissingKeyPassword { .. }));
    }
}
