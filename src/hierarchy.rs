//! Hierarchy Registry
//!
//! Models the Root → Intermediate → Leaf trust graph and the path convention
//! used to address each CA instance inside the signing backend.
//!
//! # Path Layout
//! ```text
//! {mount_prefix}/root/{base}/{client}[/{vendor}]   ← Root CA
//! {mount_prefix}/int/{base}/{client}[/{vendor}]    ← Intermediate CA
//! ```
//!
//! Components may not contain path separators, so the layout is injective:
//! two distinct (tier, base, client, vendor) tuples never share a path.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::configs::AppConfig;
use crate::error::{PkiError, Result};

/// OID for Microsoft document signing, the EKU leaf certificates carry for
/// signing office documents and PDFs.
pub const DOCUMENT_SIGNING_OID: &str = "1.3.6.1.4.1.311.10.3.12";

const ROOT_SEGMENT: &str = "root";
const INTERMEDIATE_SEGMENT: &str = "int";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Root,
    Intermediate,
}

impl Tier {
    fn segment(self) -> &'static str {
        match self {
            Tier::Root => ROOT_SEGMENT,
            Tier::Intermediate => INTERMEDIATE_SEGMENT,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Root => f.write_str("Root"),
            Tier::Intermediate => f.write_str("Intermediate"),
        }
    }
}

/// The (base, client, vendor?) triple that names a logical CA.
///
/// Passed explicitly to every operation instead of living in ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub base: String,
    pub client: String,
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Namespace {
    pub fn new(base: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: client.into(),
            vendor: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Fails with [`PkiError::InvalidName`] if any component cannot form a path.
    pub fn validate(&self) -> Result<()> {
        validate_component(&self.base)?;
        validate_component(&self.client)?;
        if let Some(vendor) = &self.vendor {
            validate_component(vendor)?;
        }
        Ok(())
    }

    pub fn issuer_name(&self, tier: Tier) -> String {
        let mut name = format!("{}-{}", self.base, self.client);
        if let Some(vendor) = &self.vendor {
            name.push('-');
            name.push_str(vendor);
        }
        match tier {
            Tier::Root => name.push_str("-root"),
            Tier::Intermediate => name.push_str("-int"),
        }
        name
    }

    pub fn common_name(&self, tier: Tier) -> String {
        let mut cn = format!("{} {}", self.base, self.client);
        if let Some(vendor) = &self.vendor {
            cn.push(' ');
            cn.push_str(vendor);
        }
        match tier {
            Tier::Root => cn.push_str(" Root CA"),
            Tier::Intermediate => cn.push_str(" Intermediate CA"),
        }
        cn
    }
}

fn validate_component(value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains('/') || value.contains('\\') {
        Some("must not contain path separators")
    } else if value == "." || value == ".." {
        Some("must not be a relative path reference")
    } else if value.chars().any(|c| c.is_control()) {
        Some("must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PkiError::InvalidName {
            value: value.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Deterministic, collision-free namespace path for one CA instance.
pub fn resolve_path(
    mount_prefix: &str,
    tier: Tier,
    base: &str,
    client: &str,
    vendor: Option<&str>,
) -> Result<String> {
    validate_component(base)?;
    validate_component(client)?;
    if let Some(vendor) = vendor {
        validate_component(vendor)?;
    }
    let mut path = format!(
        "{}/{}/{}/{}",
        mount_prefix.trim_end_matches('/'),
        tier.segment(),
        base,
        client
    );
    if let Some(vendor) = vendor {
        path.push('/');
        path.push_str(vendor);
    }
    Ok(path)
}

// ================= TTL =================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TtlUnit {
    fn suffix(self) -> &'static str {
        match self {
            TtlUnit::Seconds => "s",
            TtlUnit::Minutes => "m",
            TtlUnit::Hours => "h",
            TtlUnit::Days => "d",
        }
    }

    fn seconds(self) -> u64 {
        match self {
            TtlUnit::Seconds => 1,
            TtlUnit::Minutes => 60,
            TtlUnit::Hours => 3600,
            TtlUnit::Days => 86_400,
        }
    }
}

/// A validity duration in backend notation (`87600h`, `30d`, `90s`).
///
/// The unit is kept so that derived TTLs are expressed the same way the
/// operator wrote the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ttl {
    value: u64,
    unit: TtlUnit,
}

impl Ttl {
    pub fn new(value: u64, unit: TtlUnit) -> Self {
        Self { value, unit }
    }

    pub fn hours(value: u64) -> Self {
        Self::new(value, TtlUnit::Hours)
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn unit(&self) -> TtlUnit {
        self.unit
    }

    pub fn as_secs(&self) -> u64 {
        self.value.saturating_mul(self.unit.seconds())
    }

    pub fn to_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.as_secs()).unwrap_or(i64::MAX))
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Ttl {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = |reason: &str| PkiError::InvalidTtl {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let (digits, unit) = match trimmed.chars().last() {
            Some('s') => (&trimmed[..trimmed.len() - 1], TtlUnit::Seconds),
            Some('m') => (&trimmed[..trimmed.len() - 1], TtlUnit::Minutes),
            Some('h') => (&trimmed[..trimmed.len() - 1], TtlUnit::Hours),
            Some('d') => (&trimmed[..trimmed.len() - 1], TtlUnit::Days),
            Some(c) if c.is_ascii_digit() => (trimmed, TtlUnit::Seconds),
            Some(_) => return Err(invalid("unknown unit, expected s, m, h or d")),
            None => return Err(invalid("empty TTL")),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected an unsigned integer followed by a unit"));
        }
        let value = digits
            .parse::<u64>()
            .map_err(|_| invalid("value out of range"))?;
        Ok(Ttl { value, unit })
    }
}

impl TryFrom<String> for Ttl {
    type Error = PkiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ttl> for String {
    fn from(ttl: Ttl) -> Self {
        ttl.to_string()
    }
}

/// Default child TTL: half the parent, in the parent's unit.
///
/// Fails instead of truncating to zero, e.g. for `1h`.
pub fn compute_child_ttl(parent: &Ttl) -> Result<Ttl> {
    let half = parent.value / 2;
    if half == 0 {
        return Err(PkiError::InvalidTtl {
            value: parent.to_string(),
            reason: format!(
                "half of the parent TTL is zero in unit '{}'; use a smaller unit",
                parent.unit.suffix()
            ),
        });
    }
    Ok(Ttl::new(half, parent.unit))
}

/// Largest lifetime a new child CA may request under a parent that expires at
/// `parent_not_after`: half of the parent's remaining window.
///
/// The window is counted in whole hours, rounded up, so a child asking for
/// exactly half of a freshly created parent's TTL fits. `None` once the
/// parent has expired.
pub fn remaining_child_ttl_cap(parent_not_after: DateTime<Utc>, now: DateTime<Utc>) -> Option<Ttl> {
    let remaining = (parent_not_after - now).num_seconds();
    if remaining <= 0 {
        return None;
    }
    let remaining = remaining.unsigned_abs();
    let hours = remaining.div_ceil(3600);
    match compute_child_ttl(&Ttl::hours(hours)) {
        Ok(cap) => Some(cap),
        Err(_) => Some(Ttl::new(remaining / 2, TtlUnit::Seconds)),
    }
}

// ================= Keys and policies =================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Ec,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => f.write_str("rsa"),
            KeyType::Ec => f.write_str("ec"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub key_type: KeyType,
    pub bits: u32,
}

impl KeySpec {
    pub fn rsa(bits: u32) -> Self {
        Self {
            key_type: KeyType::Rsa,
            bits,
        }
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self::rsa(4096)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
}

impl KeyUsage {
    /// Name used by the backend role API.
    pub fn backend_name(self) -> &'static str {
        match self {
            KeyUsage::DigitalSignature => "DigitalSignature",
            KeyUsage::NonRepudiation => "ContentCommitment",
            KeyUsage::KeyEncipherment => "KeyEncipherment",
            KeyUsage::DataEncipherment => "DataEncipherment",
            KeyUsage::KeyAgreement => "KeyAgreement",
            KeyUsage::CertSign => "CertSign",
            KeyUsage::CrlSign => "CRLSign",
        }
    }

    /// Parse the label openssl prints in a certificate's text dump.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Digital Signature" => Some(KeyUsage::DigitalSignature),
            "Non Repudiation" | "Content Commitment" => Some(KeyUsage::NonRepudiation),
            "Key Encipherment" => Some(KeyUsage::KeyEncipherment),
            "Data Encipherment" => Some(KeyUsage::DataEncipherment),
            "Key Agreement" => Some(KeyUsage::KeyAgreement),
            "Certificate Sign" => Some(KeyUsage::CertSign),
            "CRL Sign" => Some(KeyUsage::CrlSign),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExtKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    DocumentSigning,
}

impl ExtKeyUsage {
    /// Backend name, or `None` for usages only expressible by OID.
    pub fn backend_name(self) -> Option<&'static str> {
        match self {
            ExtKeyUsage::ServerAuth => Some("ServerAuth"),
            ExtKeyUsage::ClientAuth => Some("ClientAuth"),
            ExtKeyUsage::CodeSigning => Some("CodeSigning"),
            ExtKeyUsage::EmailProtection => Some("EmailProtection"),
            ExtKeyUsage::DocumentSigning => None,
        }
    }

    pub fn oid(self) -> Option<&'static str> {
        match self {
            ExtKeyUsage::DocumentSigning => Some(DOCUMENT_SIGNING_OID),
            _ => None,
        }
    }
}

/// Issuance policy installed as a backend role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub max_ttl: Ttl,
    pub key_usage: BTreeSet<KeyUsage>,
    pub ext_key_usage: BTreeSet<ExtKeyUsage>,
    /// Role governs signing of subordinate CAs rather than leaf issuance.
    pub ca_signing: bool,
}

impl RolePolicy {
    /// Role installed on a root: bounds what intermediates it may sign.
    pub fn child_signing(max_ttl: Ttl) -> Self {
        Self {
            max_ttl,
            key_usage: [KeyUsage::CertSign, KeyUsage::CrlSign, KeyUsage::DigitalSignature]
                .into_iter()
                .collect(),
            ext_key_usage: BTreeSet::new(),
            ca_signing: true,
        }
    }

    /// Fixed leaf-issuance policy installed on every intermediate.
    pub fn leaf(max_ttl: Ttl) -> Self {
        Self {
            max_ttl,
            key_usage: [
                KeyUsage::DigitalSignature,
                KeyUsage::NonRepudiation,
                KeyUsage::KeyEncipherment,
            ]
            .into_iter()
            .collect(),
            ext_key_usage: [
                ExtKeyUsage::ServerAuth,
                ExtKeyUsage::ClientAuth,
                ExtKeyUsage::CodeSigning,
                ExtKeyUsage::EmailProtection,
                ExtKeyUsage::DocumentSigning,
            ]
            .into_iter()
            .collect(),
            ca_signing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role_id: String,
    pub policy: RolePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSet {
    pub issuing: Vec<String>,
    pub crl: Vec<String>,
    pub ocsp: Vec<String>,
}

/// One CA instance (Root or Intermediate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaNode {
    pub path: String,
    pub tier: Tier,
    pub issuer_name: String,
    pub max_ttl: Ttl,
    pub parent_path: Option<String>,
    pub urls: UrlSet,
    pub signing_role: RoleBinding,
}

impl CaNode {
    pub fn with_urls(mut self, urls: UrlSet) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_signing_role(mut self, role: RoleBinding) -> Self {
        self.signing_role = role;
        self
    }
}

// ================= Registry =================

/// Path addressing and policy derivation for CA nodes.
#[derive(Debug, Clone)]
pub struct HierarchyRegistry {
    mount_prefix: String,
    public_url: Option<String>,
    child_signing_role: String,
    leaf_role: String,
    leaf_max_ttl: Ttl,
}

impl HierarchyRegistry {
    pub fn new(mount_prefix: impl Into<String>) -> Self {
        Self {
            mount_prefix: mount_prefix.into(),
            public_url: None,
            child_signing_role: "intermediate-signer".to_string(),
            leaf_role: "leaf-issuer".to_string(),
            leaf_max_ttl: Ttl::hours(8760),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mount_prefix: config.backend.mount_prefix.clone(),
            public_url: config.backend.public_url.clone(),
            child_signing_role: config.defaults.child_signing_role.clone(),
            leaf_role: config.defaults.leaf_role.clone(),
            leaf_max_ttl: config.defaults.leaf_max_ttl,
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn with_leaf_max_ttl(mut self, ttl: Ttl) -> Self {
        self.leaf_max_ttl = ttl;
        self
    }

    pub fn leaf_role(&self) -> &str {
        &self.leaf_role
    }

    pub fn child_signing_role(&self) -> &str {
        &self.child_signing_role
    }

    pub fn resolve_path(
        &self,
        tier: Tier,
        base: &str,
        client: &str,
        vendor: Option<&str>,
    ) -> Result<String> {
        resolve_path(&self.mount_prefix, tier, base, client, vendor)
    }

    pub fn resolve(&self, tier: Tier, namespace: &Namespace) -> Result<String> {
        self.resolve_path(
            tier,
            &namespace.base,
            &namespace.client,
            namespace.vendor.as_deref(),
        )
    }

    /// Namespace of the CA that signed the CA at `path`: the client's root for
    /// an intermediate, `None` for a root or a path outside this layout.
    pub fn issuer_path_of(&self, path: &str) -> Option<String> {
        let prefix = self.mount_prefix.trim_end_matches('/');
        let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [INTERMEDIATE_SEGMENT, base, client] | [INTERMEDIATE_SEGMENT, base, client, _] => {
                resolve_path(prefix, Tier::Root, base, client, None).ok()
            }
            _ => None,
        }
    }

    /// Public endpoints advertised in certificates issued under `path`.
    pub fn urls_for(&self, path: &str) -> UrlSet {
        match &self.public_url {
            Some(url) => {
                let url = url.trim_end_matches('/');
                UrlSet {
                    issuing: vec![format!("{url}/v1/{path}/ca")],
                    crl: vec![format!("{url}/v1/{path}/crl")],
                    ocsp: vec![format!("{url}/v1/{path}/ocsp")],
                }
            }
            None => UrlSet::default(),
        }
    }

    pub fn root_node(&self, namespace: &Namespace, ttl: Ttl) -> Result<CaNode> {
        let path = self.resolve(Tier::Root, namespace)?;
        let policy = RolePolicy::child_signing(compute_child_ttl(&ttl)?);
        Ok(CaNode {
            urls: self.urls_for(&path),
            path,
            tier: Tier::Root,
            issuer_name: namespace.issuer_name(Tier::Root),
            max_ttl: ttl,
            parent_path: None,
            signing_role: RoleBinding {
                role_id: self.child_signing_role.clone(),
                policy,
            },
        })
    }

    pub fn intermediate_node(
        &self,
        parent_path: &str,
        namespace: &Namespace,
        ttl: Ttl,
    ) -> Result<CaNode> {
        let path = self.resolve(Tier::Intermediate, namespace)?;
        Ok(CaNode {
            urls: self.urls_for(&path),
            path,
            tier: Tier::Intermediate,
            issuer_name: namespace.issuer_name(Tier::Intermediate),
            max_ttl: ttl,
            parent_path: Some(parent_path.to_string()),
            signing_role: RoleBinding {
                role_id: self.leaf_role.clone(),
                policy: RolePolicy::leaf(self.leaf_max_ttl),
            },
        })
    }
}

impl Default for HierarchyRegistry {
    fn default() -> Self {
        Self::new("pki")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resolve_path_is_deterministic() {
        let a = resolve_path("pki", Tier::Root, "jimsnet", "abc", None).unwrap();
        let b = resolve_path("pki", Tier::Root, "jimsnet", "abc", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "pki/root/jimsnet/abc");
    }

    #[test]
    fn test_resolve_path_is_injective() {
        let triples = [
            ("a-b", "c", None),
            ("a", "b-c", None),
            ("a", "b", Some("c")),
            ("a", "b", None),
            ("ab", "c", None),
            ("a", "bc", None),
            ("a", "b", Some("c-d")),
            ("a", "b-c", Some("d")),
        ];
        let mut seen = HashSet::new();
        for tier in [Tier::Root, Tier::Intermediate] {
            for (base, client, vendor) in triples {
                let path = resolve_path("pki", tier, base, client, vendor).unwrap();
                assert!(seen.insert(path.clone()), "collision on {path}");
            }
        }
    }

    #[test]
    fn test_resolve_path_rejects_separators() {
        for bad in ["a/b", "a\\b", "", "..", "."] {
            let err = resolve_path("pki", Tier::Intermediate, "base", bad, None).unwrap_err();
            assert!(matches!(err, PkiError::InvalidName { .. }), "{bad:?}");
        }
        let err = resolve_path("pki", Tier::Intermediate, "base", "client", Some("v/1")).unwrap_err();
        assert!(matches!(err, PkiError::InvalidName { .. }));
    }

    #[test]
    fn test_ttl_parse_and_display() {
        let ttl: Ttl = "87600h".parse().unwrap();
        assert_eq!(ttl, Ttl::hours(87600));
        assert_eq!(ttl.to_string(), "87600h");
        assert_eq!("90".parse::<Ttl>().unwrap(), Ttl::new(90, TtlUnit::Seconds));
        assert_eq!("30d".parse::<Ttl>().unwrap().as_secs(), 30 * 86_400);
        assert!("h".parse::<Ttl>().is_err());
        assert!("10y".parse::<Ttl>().is_err());
        assert!("-5h".parse::<Ttl>().is_err());
    }

    #[test]
    fn test_compute_child_ttl_halves_in_same_unit() {
        let child = compute_child_ttl(&Ttl::hours(87600)).unwrap();
        assert_eq!(child.to_string(), "43800h");
        let child = compute_child_ttl(&"3d".parse().unwrap()).unwrap();
        assert_eq!(child.to_string(), "1d");
    }

    #[test]
    fn test_compute_child_ttl_never_zero() {
        let err = compute_child_ttl(&Ttl::hours(1)).unwrap_err();
        assert!(matches!(err, PkiError::InvalidTtl { .. }));
        assert!(compute_child_ttl(&Ttl::hours(0)).is_err());
    }

    #[test]
    fn test_root_node_carries_child_signing_policy() {
        let registry = HierarchyRegistry::new("pki").with_public_url("https://vault.example:8200/");
        let node = registry
            .root_node(&Namespace::new("jimsnet", "abc"), Ttl::hours(87600))
            .unwrap();
        assert_eq!(node.path, "pki/root/jimsnet/abc");
        assert_eq!(node.signing_role.policy.max_ttl, Ttl::hours(43800));
        assert!(node.signing_role.policy.ca_signing);
        assert_eq!(
            node.urls.crl,
            vec!["https://vault.example:8200/v1/pki/root/jimsnet/abc/crl".to_string()]
        );
    }

    #[test]
    fn test_leaf_policy_is_capped_independently() {
        let registry = HierarchyRegistry::new("pki");
        let ns = Namespace::new("jimsnet", "abc").with_vendor("vendor1");
        let node = registry
            .intermediate_node("pki/root/jimsnet/abc", &ns, Ttl::hours(43800))
            .unwrap();
        assert_eq!(node.signing_role.policy.max_ttl, Ttl::hours(8760));
        assert!(node.signing_role.policy.key_usage.contains(&KeyUsage::NonRepudiation));
        assert!(node
            .signing_role
            .policy
            .ext_key_usage
            .contains(&ExtKeyUsage::DocumentSigning));
    }

    #[test]
    fn test_child_cap_is_half_of_remaining_window() {
        let now = Utc::now();
        // Fresh parent: exactly half of its TTL fits despite elapsed seconds
        let cap = remaining_child_ttl_cap(now + chrono::Duration::hours(87600) - chrono::Duration::seconds(3), now);
        assert_eq!(cap, Some(Ttl::hours(43800)));

        // Parent created with 100h and 60h already gone: only 20h remain for a child
        let cap = remaining_child_ttl_cap(now + chrono::Duration::hours(40), now).unwrap();
        assert_eq!(cap, Ttl::hours(20));
        assert!(Ttl::hours(50).as_secs() > cap.as_secs());

        let cap = remaining_child_ttl_cap(now + chrono::Duration::minutes(30), now).unwrap();
        assert_eq!(cap, Ttl::new(900, TtlUnit::Seconds));

        assert_eq!(remaining_child_ttl_cap(now - chrono::Duration::seconds(1), now), None);
    }

    #[test]
    fn test_issuer_path_of_intermediate_is_client_root() {
        let registry = HierarchyRegistry::new("pki");
        assert_eq!(
            registry.issuer_path_of("pki/int/jimsnet/abc/vendor1"),
            Some("pki/root/jimsnet/abc".to_string())
        );
        assert_eq!(
            registry.issuer_path_of("pki/int/jimsnet/abc"),
            Some("pki/root/jimsnet/abc".to_string())
        );
        assert_eq!(registry.issuer_path_of("pki/root/jimsnet/abc"), None);
        assert_eq!(registry.issuer_path_of("other/int/jimsnet/abc"), None);
    }
}
