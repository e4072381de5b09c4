use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PkiError, Result};
use crate::hierarchy::{KeySpec, KeyType, Namespace, Ttl};

/// Default configuration file looked up by [`AppConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "pki-lifecycle.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Vault,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_address")]
    pub address: String,
    /// Environment variable holding the backend token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,
    /// Base URL advertised in issued certificates (AIA/CRL distribution points).
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            address: default_address(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            mount_prefix: default_mount_prefix(),
            public_url: None,
        }
    }
}

fn default_address() -> String {
    "http://127.0.0.1:8200".to_string()
}

fn default_token_env() -> String {
    "VAULT_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_mount_prefix() -> String {
    "pki".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayoutConfig {
    #[serde(default = "default_root_cert_dir")]
    pub root_cert_dir: PathBuf,
    #[serde(default = "default_intermediate_cert_dir")]
    pub intermediate_cert_dir: PathBuf,
    #[serde(default = "default_user_cert_dir")]
    pub user_cert_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root_cert_dir: default_root_cert_dir(),
            intermediate_cert_dir: default_intermediate_cert_dir(),
            user_cert_dir: default_user_cert_dir(),
        }
    }
}

fn default_root_cert_dir() -> PathBuf {
    PathBuf::from("certs/root")
}

fn default_intermediate_cert_dir() -> PathBuf {
    PathBuf::from("certs/intermediate")
}

fn default_user_cert_dir() -> PathBuf {
    PathBuf::from("certs/users")
}

#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default = "default_client")]
    pub client: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default = "default_root_ttl")]
    pub root_ttl: Ttl,
    #[serde(default)]
    pub intermediate_ttl: Option<Ttl>,
    #[serde(default = "default_leaf_ttl")]
    pub leaf_ttl: Ttl,
    #[serde(default = "default_leaf_max_ttl")]
    pub leaf_max_ttl: Ttl,
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_leaf_role")]
    pub leaf_role: String,
    #[serde(default = "default_child_signing_role")]
    pub child_signing_role: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            base: default_base(),
            client: default_client(),
            vendor: None,
            root_ttl: default_root_ttl(),
            intermediate_ttl: None,
            leaf_ttl: default_leaf_ttl(),
            leaf_max_ttl: default_leaf_max_ttl(),
            key_type: default_key_type(),
            key_bits: default_key_bits(),
            leaf_role: default_leaf_role(),
            child_signing_role: default_child_signing_role(),
        }
    }
}

fn default_base() -> String {
    "jimsnet".to_string()
}

fn default_client() -> String {
    "default".to_string()
}

fn default_root_ttl() -> Ttl {
    Ttl::hours(87600) // 10 years
}

fn default_leaf_ttl() -> Ttl {
    Ttl::hours(720)
}

fn default_leaf_max_ttl() -> Ttl {
    Ttl::hours(8760)
}

fn default_key_type() -> KeyType {
    KeyType::Rsa
}

fn default_key_bits() -> u32 {
    4096
}

fn default_leaf_role() -> String {
    "leaf-issuer".to_string()
}

fn default_child_signing_role() -> String {
    "intermediate-signer".to_string()
}

impl Defaults {
    pub fn key_spec(&self) -> KeySpec {
        KeySpec {
            key_type: self.key_type,
            bits: self.key_bits,
        }
    }

    /// Namespace built from the configured defaults, with optional overrides.
    pub fn namespace(
        &self,
        base: Option<&str>,
        client: Option<&str>,
        vendor: Option<&str>,
    ) -> Namespace {
        Namespace {
            base: base.unwrap_or(&self.base).to_string(),
            client: client.unwrap_or(&self.client).to_string(),
            vendor: vendor.map(str::to_string).or_else(|| self.vendor.clone()),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|e| PkiError::io(path, e))?;
        toml::from_str(&config_str).map_err(|e| {
            PkiError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str)
            .map_err(|e| PkiError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Load configuration with default path (pki-lifecycle.toml)
    pub fn load() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Vault);
        assert_eq!(config.backend.mount_prefix, "pki");
        assert_eq!(config.defaults.root_ttl, Ttl::hours(87600));
        assert_eq!(config.defaults.key_spec(), KeySpec::rsa(4096));
        assert_eq!(config.layout.user_cert_dir, PathBuf::from("certs/users"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [backend]
            kind = "memory"
            address = "https://vault.internal:8200"
            timeout_secs = 5
            public_url = "https://pki.example.com"

            [layout]
            user_cert_dir = "/var/lib/pki/users"

            [defaults]
            base = "acme"
            client = "widgets"
            vendor = "vendor1"
            leaf_ttl = "30d"
            key_type = "ec"
            key_bits = 384
        "#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.backend.timeout_secs, 5);
        assert_eq!(config.defaults.leaf_ttl.to_string(), "30d");
        assert_eq!(config.defaults.key_spec().key_type, KeyType::Ec);
        let ns = config.defaults.namespace(None, Some("gadgets"), None);
        assert_eq!(ns.client, "gadgets");
        assert_eq!(ns.vendor.as_deref(), Some("vendor1"));
    }

    #[test]
    fn test_bad_ttl_is_config_error() {
        let err = AppConfig::from_toml("[defaults]\nleaf_ttl = \"ten days\"").unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }
}
