//! Revocation & CRL Manager
//!
//! Revocation is irreversible, so every revoking operation takes an explicit
//! [`Confirmation`]. A denied confirmation fails before the backend is touched.
//!
//! CRL regeneration distinguishes two outcomes callers must not confuse:
//! - `Published` with zero entries: the CA has a CRL and nothing is revoked
//! - `Unavailable`: the backend has CRLs disabled, unsupported, or returned
//!   no document at all

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{CrlEntry, SigningBackend};
use crate::error::{BackendError, PkiError, Result};
use crate::ledger::{CertificateLedger, CertificateStatus, ItemFailure};

/// Operator approval for an irreversible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Denied,
}

impl Confirmation {
    pub fn from_bool(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::Denied
        }
    }

    pub fn require(self, operation: &'static str, target: impl Into<String>) -> Result<()> {
        match self {
            Confirmation::Confirmed => Ok(()),
            Confirmation::Denied => Err(PkiError::ConfirmationRequired {
                operation,
                target: target.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationResult {
    pub serial_number: String,
    pub revocation_time: DateTime<Utc>,
    /// The certificate was revoked before this call; nothing changed.
    pub already_revoked: bool,
}

#[derive(Debug, Clone)]
pub struct CrlSnapshot {
    pub path: String,
    /// Ordered by revocation time, then serial.
    pub entries: Vec<CrlEntry>,
    pub raw: Vec<u8>,
}

impl CrlSnapshot {
    pub fn contains(&self, serial: &str) -> bool {
        self.entries.iter().any(|e| e.serial_number == serial)
    }
}

#[derive(Debug, Clone)]
pub enum CrlOutcome {
    Published(CrlSnapshot),
    Unavailable { path: String, reason: String },
}

impl CrlOutcome {
    /// The snapshot, or [`PkiError::CrlUnavailable`].
    pub fn require(self) -> Result<CrlSnapshot> {
        match self {
            CrlOutcome::Published(snapshot) => Ok(snapshot),
            CrlOutcome::Unavailable { path, reason } => Err(PkiError::CrlUnavailable { path, reason }),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, CrlOutcome::Published(_))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Expired certificates revoked by this run.
    pub revoked: Vec<String>,
    /// Certificates already revoked before this run.
    pub skipped: Vec<String>,
    /// Certificates still within their validity window.
    pub active: usize,
    pub failures: Vec<ItemFailure>,
}

impl CleanupReport {
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn total(&self) -> usize {
        self.revoked.len() + self.skipped.len() + self.active + self.failures.len()
    }

    /// Turn per-item failures into [`PkiError::PartialFailure`].
    pub fn into_result(self, path: &str) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PkiError::PartialFailure {
                operation: "cleanup-expired",
                path: path.to_string(),
                failed: self.failures.len(),
                total: self.total(),
            })
        }
    }
}

pub struct RevocationManager {
    backend: Arc<dyn SigningBackend>,
    ledger: CertificateLedger,
}

impl RevocationManager {
    pub fn new(backend: Arc<dyn SigningBackend>, ledger: CertificateLedger) -> Self {
        Self { backend, ledger }
    }

    pub fn ledger(&self) -> &CertificateLedger {
        &self.ledger
    }

    /// Revoke one certificate. Revoking an already revoked serial succeeds and
    /// reports the original revocation time.
    pub fn revoke(&self, path: &str, serial: &str, confirmation: Confirmation) -> Result<RevocationResult> {
        let target = format!("{path} serial {serial}");
        confirmation.require("revoke", target.as_str())?;

        let stored = self
            .backend
            .read_cert(path, serial)
            .map_err(|e| PkiError::from_backend("certificate", target.as_str(), e))?;
        if let Some(revocation_time) = stored.revocation_time {
            info!(path = %path, serial = %serial, "Certificate already revoked");
            return Ok(RevocationResult {
                serial_number: serial.to_string(),
                revocation_time,
                already_revoked: true,
            });
        }

        let revocation_time = self
            .backend
            .revoke(path, serial)
            .map_err(|e| PkiError::from_backend("certificate", target.as_str(), e))?;
        info!(path = %path, serial = %serial, "Revoked certificate");
        Ok(RevocationResult {
            serial_number: serial.to_string(),
            revocation_time,
            already_revoked: false,
        })
    }

    /// Rotate and read back the CRL for `path`.
    pub fn regenerate_crl(&self, path: &str) -> Result<CrlOutcome> {
        let unavailable = |reason: String| -> Result<CrlOutcome> {
            warn!(path = %path, reason = %reason, "CRL unavailable");
            Ok(CrlOutcome::Unavailable {
                path: path.to_string(),
                reason,
            })
        };

        match self.backend.rotate_crl(path) {
            Ok(()) => {}
            Err(BackendError::Unsupported(reason)) => return unavailable(reason),
            Err(e) => return Err(PkiError::from_backend("namespace", path, e)),
        }

        let document = match self.backend.read_crl(path) {
            Ok(Some(document)) if !document.raw.is_empty() => document,
            Ok(_) => return unavailable("backend returned no CRL document".to_string()),
            Err(BackendError::Unsupported(reason)) => return unavailable(reason),
            Err(e) => return Err(PkiError::from_backend("namespace", path, e)),
        };

        let mut entries = document.entries;
        entries.sort_by(|a, b| {
            a.revocation_time
                .cmp(&b.revocation_time)
                .then_with(|| a.serial_number.cmp(&b.serial_number))
        });
        info!(path = %path, entries = entries.len(), "Published CRL");
        Ok(CrlOutcome::Published(CrlSnapshot {
            path: path.to_string(),
            entries,
            raw: document.raw,
        }))
    }

    /// Revoke every expired, not yet revoked certificate under `path`.
    ///
    /// Per-item failures are collected in the report; use
    /// [`CleanupReport::into_result`] to treat them as an error.
    pub fn cleanup_expired(
        &self,
        path: &str,
        now: DateTime<Utc>,
        confirmation: Confirmation,
    ) -> Result<CleanupReport> {
        confirmation.require("cleanup-expired", path)?;

        let mut report = CleanupReport::default();
        for serial in self.ledger.list_serials(path) {
            let serial = serial?;
            let record = match self.ledger.get_record(path, &serial) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path, serial = %serial, error = %e, "Could not read certificate");
                    report.failures.push(ItemFailure::new(serial, &e));
                    continue;
                }
            };
            match record.status(now) {
                CertificateStatus::Revoked => report.skipped.push(serial),
                CertificateStatus::Active => report.active += 1,
                CertificateStatus::Expired => match self.backend.revoke(path, &serial) {
                    Ok(_) => {
                        info!(path = %path, serial = %serial, not_after = %record.not_after.to_rfc3339(), "Revoked expired certificate");
                        report.revoked.push(serial);
                    }
                    Err(e) => {
                        let err = PkiError::from_backend("certificate", format!("{path} serial {serial}"), e);
                        warn!(path = %path, serial = %serial, error = %err, "Could not revoke expired certificate");
                        report.failures.push(ItemFailure::new(serial, &err));
                    }
                },
            }
        }

        info!(
            path = %path,
            revoked = report.revoked_count(),
            skipped = report.skipped_count(),
            active = report.active,
            failures = report.failures.len(),
            "Cleanup finished"
        );
        Ok(report)
    }
}
