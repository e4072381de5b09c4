//! Issuance Engine
//!
//! Runs the multi-step protocols that create CAs and issue leaves:
//!
//! ```text
//! Root:          enable → tune → generate root → configure URLs → child-signing role
//! Intermediate:  check parent (validity, revocation, TTL window) → enable → CSR
//!                → cross-sign at parent → set signed → configure URLs
//!                → default issuer → leaf role
//! Leaf:          issue under the intermediate's role
//! ```
//!
//! Steps are not rolled back. When one fails, the error names the namespace
//! path and the step so the operator can finish or clean up by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::{
    CrossSignParams, EngineType, GenerateCsrParams, GenerateRootParams, SigningBackend,
};
use crate::crypto::{CryptoProvider, ParsedCertificate};
use crate::error::{BackendError, BackendResult, IssuanceStep, PkiError, Result};
use crate::hierarchy::{
    remaining_child_ttl_cap, CaNode, HierarchyRegistry, KeySpec, Namespace, RoleBinding, Tier, Ttl,
    UrlSet,
};
use crate::key_material::KeyMaterial;
use crate::ledger::CertificateRecord;
use crate::requests::{Request, SubjectFields};

/// A CA namespace that finished every setup step.
#[derive(Debug, Clone)]
pub struct CreatedCa {
    pub node: CaNode,
    /// CA certificate; for intermediates the bundle returned by the parent.
    pub certificate_pem: String,
    pub issuer_id: Option<String>,
}

/// A freshly issued leaf with its key. The key is only available here.
#[derive(Debug)]
pub struct IssuedLeaf {
    pub record: CertificateRecord,
    pub certificate_pem: String,
    pub private_key: KeyMaterial,
    pub requested_ttl: Ttl,
    /// Expiration as reported by the backend alongside the certificate.
    pub expiration: DateTime<Utc>,
}

impl IssuedLeaf {
    /// Whether the backend shortened the requested lifetime.
    pub fn was_clamped(&self) -> bool {
        let effective = (self.record.not_after - self.record.not_before).num_seconds();
        effective < i64::try_from(self.requested_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug)]
pub enum IssuanceOutcome {
    Ca(CreatedCa),
    Leaf(IssuedLeaf),
}

pub struct IssuanceEngine {
    backend: Arc<dyn SigningBackend>,
    crypto: Arc<dyn CryptoProvider>,
    registry: HierarchyRegistry,
}

impl IssuanceEngine {
    pub fn new(
        backend: Arc<dyn SigningBackend>,
        crypto: Arc<dyn CryptoProvider>,
        registry: HierarchyRegistry,
    ) -> Self {
        Self {
            backend,
            crypto,
            registry,
        }
    }

    pub fn registry(&self) -> &HierarchyRegistry {
        &self.registry
    }

    fn step<T>(&self, path: &str, step: IssuanceStep, result: BackendResult<T>) -> Result<T> {
        match result {
            Ok(value) => {
                debug!(backend = self.backend.name(), path = %path, step = %step, "Step completed");
                Ok(value)
            }
            Err(source) => {
                warn!(path = %path, step = %step, error = %source, "Step failed");
                Err(PkiError::StepFailed {
                    path: path.to_string(),
                    step,
                    source,
                })
            }
        }
    }

    fn enable(&self, path: &str) -> Result<()> {
        match self.backend.enable_namespace(path, EngineType::Pki) {
            Err(BackendError::AlreadyExists(_)) => Err(PkiError::AlreadyExists {
                path: path.to_string(),
            }),
            result => self.step(path, IssuanceStep::EnableNamespace, result),
        }
    }

    /// Create and configure a Root CA for `namespace`.
    pub fn create_root_ca(&self, namespace: &Namespace, ttl: Ttl, key_spec: KeySpec) -> Result<CreatedCa> {
        namespace.validate()?;
        // Derives the child TTL up front so an unusable TTL fails before any call
        let node = self.registry.root_node(namespace, ttl)?;
        let path = node.path.as_str();

        self.enable(path)?;
        self.step(path, IssuanceStep::TuneNamespace, self.backend.tune(path, &ttl))?;
        let generated = self.step(
            path,
            IssuanceStep::GenerateRoot,
            self.backend.generate_root(
                path,
                &GenerateRootParams {
                    common_name: namespace.common_name(Tier::Root),
                    issuer_name: node.issuer_name.clone(),
                    key_spec,
                    ttl,
                },
            ),
        )?;
        self.step(
            path,
            IssuanceStep::ConfigureUrls,
            self.backend.configure_urls(path, &node.urls),
        )?;
        self.step(
            path,
            IssuanceStep::CreateRole,
            self.backend.create_role(
                path,
                &node.signing_role.role_id,
                &node.signing_role.policy,
            ),
        )?;

        info!(
            path = %path,
            ttl = %ttl,
            child_max_ttl = %node.signing_role.policy.max_ttl,
            serial = %generated.serial_number,
            "Created Root CA"
        );
        Ok(CreatedCa {
            certificate_pem: generated.certificate_pem,
            issuer_id: Some(generated.issuer_id).filter(|id| !id.is_empty()),
            node,
        })
    }

    /// The parent's certificate, once it is known to be within its validity
    /// window and not revoked by its own issuer.
    fn check_parent_active(&self, parent_path: &str) -> Result<ParsedCertificate> {
        let pem = self
            .backend
            .read_ca_certificate(parent_path)
            .map_err(|e| PkiError::from_backend("parent CA", parent_path, e))?;
        let parsed = self.crypto.parse_certificate(&pem)?;
        let now = Utc::now();
        if now > parsed.not_after {
            return Err(PkiError::ParentNotActive {
                path: parent_path.to_string(),
                reason: format!("expired at {}", parsed.not_after.to_rfc3339()),
            });
        }
        if now < parsed.not_before {
            return Err(PkiError::ParentNotActive {
                path: parent_path.to_string(),
                reason: format!("not valid before {}", parsed.not_before.to_rfc3339()),
            });
        }

        if let Some(issuer_path) = self.registry.issuer_path_of(parent_path) {
            match self.backend.read_cert(&issuer_path, &parsed.serial_number) {
                Ok(stored) => {
                    if let Some(revoked_at) = stored.revocation_time {
                        return Err(PkiError::ParentNotActive {
                            path: parent_path.to_string(),
                            reason: format!(
                                "revoked by {} at {}",
                                issuer_path,
                                revoked_at.to_rfc3339()
                            ),
                        });
                    }
                }
                Err(BackendError::NotFound(_)) => warn!(
                    parent_path = %parent_path,
                    issuer_path = %issuer_path,
                    serial = %parsed.serial_number,
                    "Issuer has no record of the parent certificate; revocation not checked"
                ),
                Err(e) => return Err(PkiError::from_backend("parent CA", parent_path, e)),
            }
        }
        Ok(parsed)
    }

    /// Create an Intermediate CA signed by the CA at `parent_path`.
    ///
    /// The intermediate's key is generated inside its own namespace and never
    /// leaves it; only the CSR travels to the parent.
    pub fn create_intermediate_ca(
        &self,
        parent_path: &str,
        namespace: &Namespace,
        ttl: Ttl,
        key_spec: KeySpec,
    ) -> Result<CreatedCa> {
        namespace.validate()?;
        let node = self.registry.intermediate_node(parent_path, namespace, ttl)?;
        let path = node.path.as_str();

        let parent = self.check_parent_active(parent_path)?;
        if let Some(cap) = remaining_child_ttl_cap(parent.not_after, Utc::now()) {
            if ttl.as_secs() > cap.as_secs() {
                warn!(parent_path = %parent_path, path = %path, ttl = %ttl, cap = %cap, "Child TTL exceeds parent window");
                return Err(PkiError::CrossSign {
                    parent_path: parent_path.to_string(),
                    child_path: path.to_string(),
                    reason: format!(
                        "requested TTL {} exceeds {}, half of the parent's remaining validity",
                        ttl, cap
                    ),
                });
            }
        }
        self.enable(path)?;

        let csr = self.step(
            path,
            IssuanceStep::GenerateCsr,
            self.backend.generate_csr(
                path,
                &GenerateCsrParams {
                    common_name: namespace.common_name(Tier::Intermediate),
                    issuer_name: node.issuer_name.clone(),
                    key_spec,
                },
            ),
        )?;

        let signed = match self.backend.cross_sign(
            parent_path,
            &CrossSignParams {
                csr_pem: csr,
                ttl,
                use_csr_values: true,
            },
        ) {
            Ok(signed) => signed,
            Err(BackendError::Rejected(reason)) => {
                warn!(parent_path = %parent_path, path = %path, reason = %reason, "Parent refused CSR");
                return Err(PkiError::CrossSign {
                    parent_path: parent_path.to_string(),
                    child_path: path.to_string(),
                    reason,
                });
            }
            Err(source) => {
                return Err(PkiError::StepFailed {
                    path: path.to_string(),
                    step: IssuanceStep::CrossSign,
                    source,
                })
            }
        };
        // CSR was moved into the request and is gone once signing returns

        let issuer_ids = self.step(
            path,
            IssuanceStep::SetSigned,
            self.backend.set_signed(path, &signed),
        )?;
        self.step(
            path,
            IssuanceStep::ConfigureUrls,
            self.backend.configure_urls(path, &node.urls),
        )?;
        let issuer_id = issuer_ids.into_iter().next();
        match &issuer_id {
            Some(id) => self.step(
                path,
                IssuanceStep::SetDefaultIssuer,
                self.backend.set_default_issuer(path, id),
            )?,
            None => warn!(path = %path, "Backend reported no imported issuer; default issuer unchanged"),
        }
        self.step(
            path,
            IssuanceStep::CreateRole,
            self.backend.create_role(
                path,
                &node.signing_role.role_id,
                &node.signing_role.policy,
            ),
        )?;

        info!(parent_path = %parent_path, path = %path, ttl = %ttl, "Created Intermediate CA");
        Ok(CreatedCa {
            certificate_pem: signed,
            issuer_id,
            node,
        })
    }

    /// Issue a leaf from the intermediate at `issuer_path`.
    ///
    /// The backend may clamp `ttl`; the returned record carries the effective
    /// validity window.
    pub fn issue_leaf_certificate(
        &self,
        issuer_path: &str,
        role_id: &str,
        subject: &SubjectFields,
        ttl: Ttl,
    ) -> Result<IssuedLeaf> {
        subject.validate()?;
        let issued = self.step(
            issuer_path,
            IssuanceStep::Issue,
            self.backend.issue(issuer_path, role_id, subject, &ttl),
        )?;
        let parsed = self.crypto.parse_certificate(&issued.certificate_pem)?;
        let record = CertificateRecord::from_parsed(parsed, issued.serial_number, issuer_path, None);
        if (issued.expiration - record.not_after).num_seconds().abs() > 1 {
            warn!(
                path = %issuer_path,
                serial = %record.serial_number,
                reported = %issued.expiration.to_rfc3339(),
                not_after = %record.not_after.to_rfc3339(),
                "Backend expiration differs from the certificate's notAfter"
            );
        }

        let leaf = IssuedLeaf {
            record,
            certificate_pem: issued.certificate_pem,
            private_key: issued.private_key,
            requested_ttl: ttl,
            expiration: issued.expiration,
        };
        if leaf.was_clamped() {
            info!(
                path = %issuer_path,
                requested_ttl = %ttl,
                not_after = %leaf.record.not_after.to_rfc3339(),
                "Backend clamped requested TTL"
            );
        }
        info!(
            path = %issuer_path,
            serial = %leaf.record.serial_number,
            common_name = %leaf.record.subject_common_name,
            "Issued leaf certificate"
        );
        Ok(leaf)
    }

    /// Re-apply the public URLs derived for `path`.
    pub fn update_urls(&self, path: &str) -> Result<UrlSet> {
        let urls = self.registry.urls_for(path);
        self.step(
            path,
            IssuanceStep::ConfigureUrls,
            self.backend.configure_urls(path, &urls),
        )?;
        Ok(urls)
    }

    pub fn update_signing_role(&self, path: &str, role: &RoleBinding) -> Result<()> {
        self.step(
            path,
            IssuanceStep::CreateRole,
            self.backend.create_role(path, &role.role_id, &role.policy),
        )?;
        info!(path = %path, role = %role.role_id, max_ttl = %role.policy.max_ttl, "Updated signing role");
        Ok(())
    }

    /// Dispatch a request object from a front end.
    pub fn handle(&self, request: &Request) -> Result<IssuanceOutcome> {
        match request {
            Request::CreateRoot(root) => self
                .create_root_ca(&root.namespace, root.ttl, root.key_spec)
                .map(IssuanceOutcome::Ca),
            Request::CreateIntermediate(int) => self
                .create_intermediate_ca(&int.parent_path, &int.namespace, int.ttl, int.key_spec)
                .map(IssuanceOutcome::Ca),
            Request::IssueLeaf(leaf) => self
                .issue_leaf_certificate(&leaf.issuer_path, &leaf.role_id, &leaf.subject, leaf.ttl)
                .map(IssuanceOutcome::Leaf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::OpensslProvider;
    use crate::memory_backend::MemoryBackend;

    fn engine() -> IssuanceEngine {
        IssuanceEngine::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(OpensslProvider::new()),
            HierarchyRegistry::new("pki"),
        )
    }

    #[test]
    fn test_root_rejects_unhalvable_ttl_before_backend_calls() {
        let engine = engine();
        let ns = Namespace::new("jimsnet", "abc");
        let err = engine.create_root_ca(&ns, Ttl::hours(1), KeySpec::rsa(2048)).unwrap_err();
        assert!(matches!(err, PkiError::InvalidTtl { .. }));
        // Nothing was mounted, so a proper retry still succeeds
        engine.create_root_ca(&ns, Ttl::hours(2), KeySpec::rsa(2048)).unwrap();
    }

    #[test]
    fn test_intermediate_requires_existing_parent() {
        let engine = engine();
        let ns = Namespace::new("jimsnet", "abc").with_vendor("vendor1");
        let err = engine
            .create_intermediate_ca("pki/root/jimsnet/abc", &ns, Ttl::hours(10), KeySpec::rsa(2048))
            .unwrap_err();
        assert!(matches!(err, PkiError::NotFound { what: "parent CA", .. }));
    }

    #[test]
    fn test_update_urls_and_signing_role() {
        let engine = IssuanceEngine::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(OpensslProvider::new()),
            HierarchyRegistry::new("pki").with_public_url("https://pki.example.com/"),
        );
        let root = engine
            .create_root_ca(&Namespace::new("jimsnet", "abc"), Ttl::hours(100), KeySpec::rsa(2048))
            .unwrap();
        assert_eq!(
            root.node.urls.crl,
            vec!["https://pki.example.com/v1/pki/root/jimsnet/abc/crl".to_string()]
        );

        let urls = engine.update_urls(&root.node.path).unwrap();
        assert_eq!(urls, root.node.urls);

        let role = RoleBinding {
            role_id: root.node.signing_role.role_id.clone(),
            policy: crate::hierarchy::RolePolicy::child_signing(Ttl::hours(10)),
        };
        engine.update_signing_role(&root.node.path, &role).unwrap();

        // The tightened role now caps intermediates at 10h
        let err = engine
            .create_intermediate_ca(
                &root.node.path,
                &Namespace::new("jimsnet", "abc").with_vendor("v1"),
                Ttl::hours(20),
                KeySpec::rsa(2048),
            )
            .unwrap_err();
        assert!(matches!(err, PkiError::CrossSign { .. }));
    }

    #[test]
    fn test_leaf_requires_common_name() {
        let engine = engine();
        let err = engine
            .issue_leaf_certificate("pki/int/a/b", "leaf-issuer", &SubjectFields::new(""), Ttl::hours(1))
            .unwrap_err();
        assert!(matches!(err, PkiError::InvalidName { .. }));
    }

    #[test]
    fn test_step_failure_names_path() {
        let engine = engine();
        let err = engine
            .issue_leaf_certificate("pki/int/a/b", "leaf-issuer", &SubjectFields::new("alice"), Ttl::hours(1))
            .unwrap_err();
        match err {
            PkiError::StepFailed { path, step, .. } => {
                assert_eq!(path, "pki/int/a/b");
                assert_eq!(step, IssuanceStep::Issue);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
