//! Certificate Ledger
//!
//! Read-side view over the certificates a CA namespace has issued. Nothing is
//! cached: every listing goes back to the signing backend, and a record's
//! status is derived at the moment it is asked for.
//!
//! Bulk reads never stop on a single unreadable certificate; failures are
//! collected next to the records that did load.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::SigningBackend;
use crate::crypto::{CryptoProvider, ParsedCertificate};
use crate::error::{PkiError, Result};
use crate::hierarchy::KeyUsage;
use crate::storage::{ArtifactStore, CredentialScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateStatus::Active => f.pad("Active"),
            CertificateStatus::Expired => f.pad("Expired"),
            CertificateStatus::Revoked => f.pad("Revoked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRecord {
    pub serial_number: String,
    pub subject_common_name: String,
    pub issuer_path: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// `None` until revoked; once set it never changes.
    pub revocation_time: Option<DateTime<Utc>>,
    pub key_usage: BTreeSet<KeyUsage>,
    pub has_encrypted_key: bool,
}

impl CertificateRecord {
    pub fn from_parsed(
        parsed: ParsedCertificate,
        serial_number: impl Into<String>,
        issuer_path: impl Into<String>,
        revocation_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            subject_common_name: parsed.subject_common_name,
            issuer_path: issuer_path.into(),
            not_before: parsed.not_before,
            not_after: parsed.not_after,
            revocation_time,
            key_usage: parsed.key_usage,
            has_encrypted_key: false,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> CertificateStatus {
        derive_status(self, now)
    }
}

/// Revoked takes precedence over Expired.
pub fn derive_status(record: &CertificateRecord, now: DateTime<Utc>) -> CertificateStatus {
    if record.revocation_time.is_some() {
        CertificateStatus::Revoked
    } else if now > record.not_after {
        CertificateStatus::Expired
    } else {
        CertificateStatus::Active
    }
}

/// A serial that could not be read or acted on during a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub serial_number: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(serial_number: impl Into<String>, err: &PkiError) -> Self {
        Self {
            serial_number: serial_number.into(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordReport {
    pub records: Vec<CertificateRecord>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub revoked: usize,
    pub unreadable: usize,
}

/// Lazy serial listing. The backend is queried on the first `next()`.
///
/// Calling [`CertificateLedger::list_serials`] again starts a fresh listing.
pub struct SerialIter<'a> {
    backend: &'a dyn SigningBackend,
    path: String,
    serials: Option<std::vec::IntoIter<String>>,
    failed: bool,
}

impl Iterator for SerialIter<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.serials.is_none() {
            match self.backend.list_certs(&self.path) {
                Ok(serials) => {
                    debug!(path = %self.path, count = serials.len(), "Listed serials");
                    self.serials = Some(serials.into_iter());
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(PkiError::from_backend("namespace", self.path.clone(), e)));
                }
            }
        }
        self.serials.as_mut().and_then(Iterator::next).map(Ok)
    }
}

pub struct CertificateLedger {
    backend: Arc<dyn SigningBackend>,
    crypto: Arc<dyn CryptoProvider>,
    artifacts: Option<(ArtifactStore, CredentialScope)>,
}

impl CertificateLedger {
    pub fn new(backend: Arc<dyn SigningBackend>, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            backend,
            crypto,
            artifacts: None,
        }
    }

    /// Consult the artifact store to fill `has_encrypted_key`.
    pub fn with_artifacts(mut self, store: ArtifactStore, scope: CredentialScope) -> Self {
        self.artifacts = Some((store, scope));
        self
    }

    pub fn list_serials(&self, path: &str) -> SerialIter<'_> {
        SerialIter {
            backend: self.backend.as_ref(),
            path: path.to_string(),
            serials: None,
            failed: false,
        }
    }

    pub fn get_record(&self, path: &str, serial: &str) -> Result<CertificateRecord> {
        let stored = self
            .backend
            .read_cert(path, serial)
            .map_err(|e| PkiError::from_backend("certificate", format!("{path} serial {serial}"), e))?;
        let parsed = self.crypto.parse_certificate(&stored.certificate_pem)?;
        let mut record =
            CertificateRecord::from_parsed(parsed, stored.serial_number, path, stored.revocation_time);
        if let Some((store, scope)) = &self.artifacts {
            record.has_encrypted_key = store.has_encrypted_key(scope, &record.subject_common_name);
        }
        Ok(record)
    }

    /// Every record under `path`. Only a failed listing is an error.
    pub fn records(&self, path: &str) -> Result<RecordReport> {
        let mut report = RecordReport::default();
        for serial in self.list_serials(path) {
            let serial = serial?;
            match self.get_record(path, &serial) {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    warn!(path = %path, serial = %serial, error = %e, "Skipping unreadable certificate");
                    report.failures.push(ItemFailure::new(serial, &e));
                }
            }
        }
        Ok(report)
    }

    /// Case-insensitive substring match on the subject common name.
    pub fn search(&self, path: &str, pattern: &str) -> Result<RecordReport> {
        let needle = pattern.to_lowercase();
        let mut report = self.records(path)?;
        report
            .records
            .retain(|record| record.subject_common_name.to_lowercase().contains(&needle));
        debug!(path = %path, pattern = %pattern, matches = report.records.len(), "Searched ledger");
        Ok(report)
    }

    pub fn summary(&self, path: &str, now: DateTime<Utc>) -> Result<LedgerSummary> {
        let report = self.records(path)?;
        let mut summary = LedgerSummary {
            total: report.records.len() + report.failures.len(),
            unreadable: report.failures.len(),
            ..LedgerSummary::default()
        };
        for record in &report.records {
            match record.status(now) {
                CertificateStatus::Active => summary.active += 1,
                CertificateStatus::Expired => summary.expired += 1,
                CertificateStatus::Revoked => summary.revoked += 1,
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(not_after: DateTime<Utc>, revoked: Option<DateTime<Utc>>) -> CertificateRecord {
        CertificateRecord {
            serial_number: "01:02".to_string(),
            subject_common_name: "John Smith".to_string(),
            issuer_path: "pki/int/jimsnet/abc/vendor1".to_string(),
            not_before: not_after - Duration::hours(720),
            not_after,
            revocation_time: revoked,
            key_usage: BTreeSet::new(),
            has_encrypted_key: false,
        }
    }

    #[test]
    fn test_status_active_and_expired() {
        let now = Utc::now();
        assert_eq!(derive_status(&record(now + Duration::hours(1), None), now), CertificateStatus::Active);
        assert_eq!(derive_status(&record(now - Duration::hours(1), None), now), CertificateStatus::Expired);
    }

    #[test]
    fn test_revoked_beats_expired() {
        let now = Utc::now();
        let expired_and_revoked = record(now - Duration::hours(1), Some(now - Duration::hours(2)));
        assert_eq!(expired_and_revoked.status(now), CertificateStatus::Revoked);
    }

    #[test]
    fn test_not_after_boundary_is_active() {
        let now = Utc::now();
        assert_eq!(record(now, None).status(now), CertificateStatus::Active);
    }
}
