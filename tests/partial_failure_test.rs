//! Bulk operations keep going when a single serial fails.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use pki_lifecycle::backend::{
    CrlDocument, CrossSignParams, EngineType, GenerateCsrParams, GenerateRootParams, GeneratedCa,
    IssuedCredential, StoredCertificate,
};
use pki_lifecycle::crypto::{CryptoProvider, OpensslProvider};
use pki_lifecycle::error::BackendResult;
use pki_lifecycle::hierarchy::{HierarchyRegistry, KeySpec, Namespace, RolePolicy, Ttl, UrlSet};
use pki_lifecycle::issuance::IssuanceEngine;
use pki_lifecycle::ledger::CertificateLedger;
use pki_lifecycle::memory_backend::MemoryBackend;
use pki_lifecycle::requests::SubjectFields;
use pki_lifecycle::revocation::{Confirmation, RevocationManager};
use pki_lifecycle::{BackendError, PkiError, SigningBackend};

/// Delegates to [`MemoryBackend`] but fails reads or revocations of chosen serials.
#[derive(Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    unreadable: Mutex<HashSet<String>>,
    unrevocable: Mutex<HashSet<String>>,
}

impl FlakyBackend {
    fn break_read(&self, serial: &str) {
        self.unreadable.lock().unwrap().insert(serial.to_string());
    }

    fn break_revoke(&self, serial: &str) {
        self.unrevocable.lock().unwrap().insert(serial.to_string());
    }
}

impl SigningBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn enable_namespace(&self, path: &str, engine: EngineType) -> BackendResult<()> {
        self.inner.enable_namespace(path, engine)
    }

    fn tune(&self, path: &str, max_ttl: &Ttl) -> BackendResult<()> {
        self.inner.tune(path, max_ttl)
    }

    fn generate_root(&self, path: &str, params: &GenerateRootParams) -> BackendResult<GeneratedCa> {
        self.inner.generate_root(path, params)
    }

    fn generate_csr(&self, path: &str, params: &GenerateCsrParams) -> BackendResult<String> {
        self.inner.generate_csr(path, params)
    }

    fn cross_sign(&self, parent_path: &str, params: &CrossSignParams) -> BackendResult<String> {
        self.inner.cross_sign(parent_path, params)
    }

    fn set_signed(&self, path: &str, certificate_pem: &str) -> BackendResult<Vec<String>> {
        self.inner.set_signed(path, certificate_pem)
    }

    fn configure_urls(&self, path: &str, urls: &UrlSet) -> BackendResult<()> {
        self.inner.configure_urls(path, urls)
    }

    fn set_default_issuer(&self, path: &str, issuer_id: &str) -> BackendResult<()> {
        self.inner.set_default_issuer(path, issuer_id)
    }

    fn create_role(&self, path: &str, role_id: &str, policy: &RolePolicy) -> BackendResult<()> {
        self.inner.create_role(path, role_id, policy)
    }

    fn issue(
        &self,
        path: &str,
        role_id: &str,
        subject: &SubjectFields,
        ttl: &Ttl,
    ) -> BackendResult<IssuedCredential> {
        self.inner.issue(path, role_id, subject, ttl)
    }

    fn list_certs(&self, path: &str) -> BackendResult<Vec<String>> {
        self.inner.list_certs(path)
    }

    fn read_cert(&self, path: &str, serial: &str) -> BackendResult<StoredCertificate> {
        if self.unreadable.lock().unwrap().contains(serial) {
            return Err(BackendError::Timeout(format!("read {path}/cert/{serial}")));
        }
        self.inner.read_cert(path, serial)
    }

    fn revoke(&self, path: &str, serial: &str) -> BackendResult<DateTime<Utc>> {
        if self.unrevocable.lock().unwrap().contains(serial) {
            return Err(BackendError::Transport(format!("revoke {path} {serial}: connection reset")));
        }
        self.inner.revoke(path, serial)
    }

    fn rotate_crl(&self, path: &str) -> BackendResult<()> {
        self.inner.rotate_crl(path)
    }

    fn read_crl(&self, path: &str) -> BackendResult<Option<CrlDocument>> {
        self.inner.read_crl(path)
    }

    fn read_ca_certificate(&self, path: &str) -> BackendResult<String> {
        self.inner.read_ca_certificate(path)
    }
}

struct Setup {
    backend: Arc<FlakyBackend>,
    engine: IssuanceEngine,
    ledger: CertificateLedger,
    issuer_path: String,
}

impl Setup {
    fn new() -> Self {
        let backend = Arc::new(FlakyBackend::default());
        let crypto: Arc<dyn CryptoProvider> = Arc::new(OpensslProvider::new());
        let engine = IssuanceEngine::new(backend.clone(), crypto.clone(), HierarchyRegistry::new("pki"));
        let root = engine
            .create_root_ca(&Namespace::new("jimsnet", "abc"), Ttl::hours(200), KeySpec::rsa(2048))
            .unwrap();
        let intermediate = engine
            .create_intermediate_ca(
                &root.node.path,
                &Namespace::new("jimsnet", "abc").with_vendor("vendor1"),
                Ttl::hours(100),
                KeySpec::rsa(2048),
            )
            .unwrap();
        Self {
            ledger: CertificateLedger::new(backend.clone(), crypto),
            issuer_path: intermediate.node.path,
            backend,
            engine,
        }
    }

    fn issue(&self, common_name: &str, ttl: &str) -> String {
        self.engine
            .issue_leaf_certificate(
                &self.issuer_path,
                self.engine.registry().leaf_role(),
                &SubjectFields::new(common_name),
                ttl.parse().unwrap(),
            )
            .unwrap()
            .record
            .serial_number
    }

    fn revocations(&self) -> RevocationManager {
        let ledger = CertificateLedger::new(self.backend.clone(), Arc::new(OpensslProvider::new()));
        RevocationManager::new(self.backend.clone(), ledger)
    }
}

#[test]
fn test_search_reports_unreadable_serial_and_returns_the_rest() {
    let setup = Setup::new();
    setup.issue("John Appleseed", "24h");
    let broken = setup.issue("John Broken", "24h");
    setup.issue("john carter", "24h");
    setup.backend.break_read(&broken);

    let report = setup.ledger.search(&setup.issuer_path, "john").unwrap();
    let mut names: Vec<_> = report
        .records
        .iter()
        .map(|r| r.subject_common_name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["John Appleseed", "john carter"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].serial_number, broken);

    let summary = setup.ledger.summary(&setup.issuer_path, Utc::now()).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.unreadable, 1);
}

#[test]
fn test_cleanup_continues_past_failed_revoke() {
    let setup = Setup::new();
    let expired: Vec<String> = (0..3).map(|i| setup.issue(&format!("old-{i}"), "1s")).collect();
    setup.issue("current", "24h");
    setup.backend.break_revoke(&expired[1]);

    let later = Utc::now() + Duration::hours(1);
    let report = setup
        .revocations()
        .cleanup_expired(&setup.issuer_path, later, Confirmation::Confirmed)
        .unwrap();

    let mut revoked = report.revoked.clone();
    revoked.sort_unstable();
    let mut expected = vec![expired[0].clone(), expired[2].clone()];
    expected.sort_unstable();
    assert_eq!(revoked, expected);
    assert_eq!(report.active, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].serial_number, expired[1]);

    match report.into_result(&setup.issuer_path).unwrap_err() {
        PkiError::PartialFailure { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 4);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_cleanup_continues_past_unreadable_record() {
    let setup = Setup::new();
    let first = setup.issue("old-a", "1s");
    let unreadable = setup.issue("old-b", "1s");
    setup.backend.break_read(&unreadable);

    let later = Utc::now() + Duration::hours(1);
    let report = setup
        .revocations()
        .cleanup_expired(&setup.issuer_path, later, Confirmation::Confirmed)
        .unwrap();
    assert_eq!(report.revoked, vec![first]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].serial_number, unreadable);
}
