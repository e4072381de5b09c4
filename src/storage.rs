//! Artifact Storage Module
//!
//! Owns the on-disk layout for certificates, private keys and PKCS#12 bundles
//! produced by the lifecycle. The signing backend remains the source of truth
//! for CA keys and issued serials; these files are operator-facing copies.
//!
//! # Directory Layout
//!
//! ```text
//! {root_cert_dir}/{base}/{client}.crt
//! {intermediate_cert_dir}/{base}_{client}/{vendor|ca}.crt
//! {user_cert_dir}/{client}_{vendor}/{cn}.crt
//! {user_cert_dir}/{client}_{vendor}/{cn}.key       (plaintext PKCS#8)
//! {user_cert_dir}/{client}_{vendor}/{cn}.key.enc   (encrypted PKCS#8)
//! {user_cert_dir}/{client}_{vendor}/{cn}.p12
//! ```
//!
//! Common names are sanitized before being used as file names: spaces and
//! path separators become `_`.
//!
//! # Security Features
//!
//! - **Restrictive file permissions**: key files and bundles are 0600 on Unix
//! - **Single key form**: writing one key encoding removes the other, so a
//!   plaintext and an encrypted copy never coexist
//!
//! # Example
//!
//! ```no_run
//! use pki_lifecycle::configs::LayoutConfig;
//! use pki_lifecycle::storage::{ArtifactStore, CredentialScope};
//!
//! # fn example() -> pki_lifecycle::Result<()> {
//! let store = ArtifactStore::new(LayoutConfig::default());
//! let scope = CredentialScope::new("abc", Some("vendor1"));
//!
//! if let Some(pem) = store.read_certificate(&scope, "John Smith")? {
//!     println!("{}", pem);
//! }
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::configs::LayoutConfig;
use crate::error::{PkiError, Result};
use crate::hierarchy::Namespace;
use crate::key_material::{KeyEncoding, KeyMaterial};

const INTERMEDIATE_WITHOUT_VENDOR: &str = "ca";

/// Replace characters that cannot appear in a single path component.
///
/// Distinct names can collide (`John Smith` and `John_Smith`);
/// [`CredentialManager::persist_credential`](crate::credentials::CredentialManager::persist_credential)
/// refuses to overwrite a certificate issued to a different subject.
pub fn sanitize_common_name(common_name: &str) -> String {
    common_name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Selects the per-(client, vendor) directory holding user credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub client: String,
    pub vendor: Option<String>,
}

impl CredentialScope {
    pub fn new(client: impl Into<String>, vendor: Option<&str>) -> Self {
        Self {
            client: client.into(),
            vendor: vendor.map(str::to_string),
        }
    }

    pub fn from_namespace(namespace: &Namespace) -> Self {
        Self::new(namespace.client.clone(), namespace.vendor.as_deref())
    }

    fn directory_name(&self) -> String {
        match &self.vendor {
            Some(vendor) => format!("{}_{}", self.client, vendor),
            None => self.client.clone(),
        }
    }
}

/// File-system layout for exported artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: LayoutConfig,
}

impl ArtifactStore {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn root_certificate_path(&self, namespace: &Namespace) -> PathBuf {
        self.layout
            .root_cert_dir
            .join(&namespace.base)
            .join(format!("{}.crt", namespace.client))
    }

    pub fn intermediate_certificate_path(&self, namespace: &Namespace) -> PathBuf {
        let file = namespace
            .vendor
            .as_deref()
            .unwrap_or(INTERMEDIATE_WITHOUT_VENDOR);
        self.layout
            .intermediate_cert_dir
            .join(format!("{}_{}", namespace.base, namespace.client))
            .join(format!("{}.crt", file))
    }

    pub fn user_directory(&self, scope: &CredentialScope) -> PathBuf {
        self.layout.user_cert_dir.join(scope.directory_name())
    }

    fn user_file(&self, scope: &CredentialScope, common_name: &str, extension: &str) -> PathBuf {
        self.user_directory(scope)
            .join(format!("{}.{}", sanitize_common_name(common_name), extension))
    }

    pub fn certificate_path(&self, scope: &CredentialScope, common_name: &str) -> PathBuf {
        self.user_file(scope, common_name, "crt")
    }

    pub fn key_path(&self, scope: &CredentialScope, common_name: &str) -> PathBuf {
        self.user_file(scope, common_name, "key")
    }

    pub fn encrypted_key_path(&self, scope: &CredentialScope, common_name: &str) -> PathBuf {
        self.user_file(scope, common_name, "key.enc")
    }

    pub fn pkcs12_path(&self, scope: &CredentialScope, common_name: &str) -> PathBuf {
        self.user_file(scope, common_name, "p12")
    }

    /// Write a CA certificate for `namespace` at the Root tier.
    pub fn write_root_certificate(&self, namespace: &Namespace, pem: &str) -> Result<PathBuf> {
        let path = self.root_certificate_path(namespace);
        write_file(&path, pem.as_bytes(), false)?;
        Ok(path)
    }

    pub fn write_intermediate_certificate(&self, namespace: &Namespace, pem: &str) -> Result<PathBuf> {
        let path = self.intermediate_certificate_path(namespace);
        write_file(&path, pem.as_bytes(), false)?;
        Ok(path)
    }

    pub fn read_intermediate_certificate(&self, namespace: &Namespace) -> Result<Option<String>> {
        read_optional(&self.intermediate_certificate_path(namespace))
    }

    pub fn write_certificate(
        &self,
        scope: &CredentialScope,
        common_name: &str,
        pem: &str,
    ) -> Result<PathBuf> {
        let path = self.certificate_path(scope, common_name);
        write_file(&path, pem.as_bytes(), false)?;
        Ok(path)
    }

    pub fn read_certificate(&self, scope: &CredentialScope, common_name: &str) -> Result<Option<String>> {
        read_optional(&self.certificate_path(scope, common_name))
    }

    /// Store a private key under the file matching its encoding.
    ///
    /// Writing an encrypted key deletes any plaintext copy; writing a plaintext
    /// key deletes any stale encrypted copy.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Io`] if the directory cannot be created, the file
    /// cannot be written, or the other copy cannot be removed.
    pub fn write_key(
        &self,
        scope: &CredentialScope,
        common_name: &str,
        key: &KeyMaterial,
    ) -> Result<PathBuf> {
        let (path, other) = match key.encoding() {
            KeyEncoding::Plain => (
                self.key_path(scope, common_name),
                self.encrypted_key_path(scope, common_name),
            ),
            KeyEncoding::Encrypted => (
                self.encrypted_key_path(scope, common_name),
                self.key_path(scope, common_name),
            ),
        };
        write_file(&path, key.expose_pem().as_bytes(), true)?;
        remove_if_exists(&other)?;
        debug!(path = %path.display(), encoding = ?key.encoding(), "Wrote private key");
        Ok(path)
    }

    /// Read the stored key, preferring the encrypted copy.
    pub fn read_key(&self, scope: &CredentialScope, common_name: &str) -> Result<Option<KeyMaterial>> {
        if let Some(pem) = read_optional(&self.encrypted_key_path(scope, common_name))? {
            return Ok(Some(KeyMaterial::encrypted(pem)));
        }
        Ok(read_optional(&self.key_path(scope, common_name))?.map(KeyMaterial::from_pem))
    }

    pub fn has_encrypted_key(&self, scope: &CredentialScope, common_name: &str) -> bool {
        self.encrypted_key_path(scope, common_name).is_file()
    }

    pub fn write_pkcs12(
        &self,
        scope: &CredentialScope,
        common_name: &str,
        der: &[u8],
    ) -> Result<PathBuf> {
        let path = self.pkcs12_path(scope, common_name);
        write_file(&path, der, true)?;
        Ok(path)
    }
}

fn write_file(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PkiError::io(parent, e))?;
    }
    // Remove existing file so the new one is created with fresh permissions
    remove_if_exists(path)?;
    fs::write(path, contents).map_err(|e| PkiError::io(path, e))?;

    // Set restrictive permissions (Unix only)
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| PkiError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = private;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PkiError::io(path, e)),
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PkiError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(LayoutConfig {
            root_cert_dir: dir.path().join("root"),
            intermediate_cert_dir: dir.path().join("int"),
            user_cert_dir: dir.path().join("users"),
        })
    }

    #[test]
    fn test_sanitize_common_name() {
        assert_eq!(sanitize_common_name("John Smith"), "John_Smith");
        assert_eq!(sanitize_common_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_common_name("bob@example.com"), "bob@example.com");
    }

    #[test]
    fn test_layout_paths() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let ns = Namespace::new("jimsnet", "abc").with_vendor("vendor1");
        assert_eq!(
            store.root_certificate_path(&ns),
            dir.path().join("root/jimsnet/abc.crt")
        );
        assert_eq!(
            store.intermediate_certificate_path(&ns),
            dir.path().join("int/jimsnet_abc/vendor1.crt")
        );
        assert_eq!(
            store.intermediate_certificate_path(&Namespace::new("jimsnet", "abc")),
            dir.path().join("int/jimsnet_abc/ca.crt")
        );
        let scope = CredentialScope::from_namespace(&ns);
        assert_eq!(
            store.pkcs12_path(&scope, "John Smith"),
            dir.path().join("users/abc_vendor1/John_Smith.p12")
        );
    }

    #[test]
    fn test_write_key_keeps_single_form() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let scope = CredentialScope::new("abc", Some("vendor1"));

        store
            .write_key(&scope, "alice", &KeyMaterial::plain("plain"))
            .unwrap();
        assert!(store.key_path(&scope, "alice").is_file());

        store
            .write_key(&scope, "alice", &KeyMaterial::encrypted("cipher"))
            .unwrap();
        assert!(!store.key_path(&scope, "alice").exists());
        assert!(store.has_encrypted_key(&scope, "alice"));

        let key = store.read_key(&scope, "alice").unwrap().unwrap();
        assert!(key.is_encrypted());
        assert_eq!(key.expose_pem(), "cipher");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let scope = CredentialScope::new("abc", None);
        let path = store
            .write_key(&scope, "alice", &KeyMaterial::plain("plain"))
            .unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_files_read_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let scope = CredentialScope::new("abc", None);
        assert!(store.read_certificate(&scope, "nobody").unwrap().is_none());
        assert!(store.read_key(&scope, "nobody").unwrap().is_none());
    }
}
