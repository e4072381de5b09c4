//! Request objects
//!
//! Front ends (CLI, API, TUI) populate these and hand them to the core; the
//! core itself never prompts. Requests are serde types so they can also be
//! loaded from JSON files.

use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};
use crate::hierarchy::{KeySpec, Namespace, Ttl};

/// Subject fields for a leaf certificate. Only the common name is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubjectFields {
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl SubjectFields {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.organizational_unit = Some(ou.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(PkiError::InvalidName {
                value: self.common_name.clone(),
                reason: "common name is mandatory".to_string(),
            });
        }
        if let Some(country) = &self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(PkiError::InvalidName {
                    value: country.clone(),
                    reason: "country must be a two-letter ISO code".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootCaRequest {
    pub namespace: Namespace,
    pub ttl: Ttl,
    #[serde(default)]
    pub key_spec: KeySpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntermediateCaRequest {
    pub parent_path: String,
    pub namespace: Namespace,
    pub ttl: Ttl,
    #[serde(default)]
    pub key_spec: KeySpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeafRequest {
    pub issuer_path: String,
    pub role_id: String,
    pub subject: SubjectFields,
    pub ttl: Ttl,
}

/// Request file consumed by front ends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    CreateRoot(RootCaRequest),
    CreateIntermediate(IntermediateCaRequest),
    IssueLeaf(LeafRequest),
}

impl Request {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PkiError::Config(format!("failed to parse request JSON: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PkiError::Config(format!("failed to serialize request: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_leaf_request() {
        let json = r#"{
            "type": "IssueLeaf",
            "issuer_path": "pki/int/jimsnet/abc/vendor1",
            "role_id": "leaf-issuer",
            "subject": { "common_name": "bob@example.com", "country": "US" },
            "ttl": "720h"
        }"#;
        let request = Request::from_json(json).unwrap();
        if let Request::IssueLeaf(leaf) = request {
            assert_eq!(leaf.subject.common_name, "bob@example.com");
            assert_eq!(leaf.ttl, Ttl::hours(720));
            assert!(leaf.subject.organization.is_none());
        } else {
            panic!("Wrong request type");
        }
    }

    #[test]
    fn test_root_request_defaults_key_spec() {
        let json = r#"{"type":"CreateRoot","namespace":{"base":"jimsnet","client":"abc"},"ttl":"87600h"}"#;
        match Request::from_json(json).unwrap() {
            Request::CreateRoot(root) => {
                assert_eq!(root.key_spec, KeySpec::rsa(4096));
                assert!(root.namespace.vendor.is_none());
            }
            _ => panic!("Wrong request type"),
        }
    }

    #[test]
    fn test_subject_requires_common_name() {
        assert!(SubjectFields::new("  ").validate().is_err());
        assert!(SubjectFields::new("alice").country("USA").validate().is_err());
        assert!(SubjectFields::new("alice").country("US").validate().is_ok());
    }
}
