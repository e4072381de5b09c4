//! Error types for the CA lifecycle core
//!
//! Every variant carries the path, serial, or common name it concerns so an
//! operator can tell exactly what failed and resume from there.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Steps of the multi-step issuance protocols.
///
/// Reported inside [`PkiError::StepFailed`] so a partially configured
/// namespace can be resumed or cleaned up by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStep {
    EnableNamespace,
    TuneNamespace,
    GenerateRoot,
    GenerateCsr,
    CrossSign,
    SetSigned,
    ConfigureUrls,
    SetDefaultIssuer,
    CreateRole,
    Issue,
}

impl fmt::Display for IssuanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssuanceStep::EnableNamespace => "enable namespace",
            IssuanceStep::TuneNamespace => "tune namespace",
            IssuanceStep::GenerateRoot => "generate root",
            IssuanceStep::GenerateCsr => "generate CSR",
            IssuanceStep::CrossSign => "cross-sign",
            IssuanceStep::SetSigned => "install signed certificate",
            IssuanceStep::ConfigureUrls => "configure URLs",
            IssuanceStep::SetDefaultIssuer => "set default issuer",
            IssuanceStep::CreateRole => "create role",
            IssuanceStep::Issue => "issue certificate",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`SigningBackend`](crate::backend::SigningBackend).
///
/// Backends classify their own failures; the core maps them into
/// [`PkiError`] according to the step that was running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected by policy: {0}")]
    Rejected(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum PkiError {
    #[error("invalid name component {value:?}: {reason}")]
    InvalidName { value: String, reason: String },

    #[error("invalid TTL {value:?}: {reason}")]
    InvalidTtl { value: String, reason: String },

    #[error("namespace {path} already exists")]
    AlreadyExists { path: String },

    #[error("parent {parent_path} refused to sign CSR for {child_path}: {reason}")]
    CrossSign {
        parent_path: String,
        child_path: String,
        reason: String,
    },

    #[error("{what} not found: {target}")]
    NotFound { what: &'static str, target: String },

    #[error("parent CA {path} is not active ({reason})")]
    ParentNotActive { path: String, reason: String },

    #[error("CRL unavailable for {path}: {reason}")]
    CrlUnavailable { path: String, reason: String },

    #[error("{operation} on {path} finished with {failed} failed item(s) out of {total}")]
    PartialFailure {
        operation: &'static str,
        path: String,
        failed: usize,
        total: usize,
    },

    #[error("{path} already holds a credential for {existing:?}, refusing to overwrite it with {requested:?}")]
    CredentialConflict {
        path: PathBuf,
        existing: String,
        requested: String,
    },

    #[error("password confirmation for {common_name} does not match")]
    PasswordMismatch { common_name: String },

    #[error("private key for {common_name} is encrypted and no key password was given")]
    MissingKeyPassword { common_name: String },

    #[error("{operation} on {target} is irreversible and was not confirmed")]
    ConfirmationRequired {
        operation: &'static str,
        target: String,
    },

    #[error("step '{step}' failed for {path}: {source}")]
    StepFailed {
        path: String,
        step: IssuanceStep,
        #[source]
        source: BackendError,
    },

    #[error("backend call on {target} failed: {source}")]
    Backend {
        target: String,
        #[source]
        source: BackendError,
    },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PkiError>;

impl PkiError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PkiError::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a backend failure outside the issuance protocols.
    ///
    /// `NotFound` keeps its meaning; everything else is wrapped with the target.
    pub(crate) fn from_backend(what: &'static str, target: impl Into<String>, err: BackendError) -> Self {
        let target = target.into();
        match err {
            BackendError::NotFound(_) => PkiError::NotFound { what, target },
            source => PkiError::Backend { target, source },
        }
    }
}

impl From<openssl::error::ErrorStack> for PkiError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        PkiError::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_names_path_and_step() {
        let err = PkiError::StepFailed {
            path: "pki/root/jimsnet/abc".to_string(),
            step: IssuanceStep::ConfigureUrls,
            source: BackendError::Transport("connection reset".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("pki/root/jimsnet/abc"));
        assert!(msg.contains("configure URLs"));
    }

    #[test]
    fn test_from_backend_keeps_not_found() {
        let err = PkiError::from_backend(
            "certificate",
            "pki/int/a/b/c serial 01",
            BackendError::NotFound("no such serial".to_string()),
        );
        assert!(matches!(err, PkiError::NotFound { what: "certificate", .. }));

        let err = PkiError::from_backend(
            "certificate",
            "pki/int/a/b/c",
            BackendError::Timeout("30s".to_string()),
        );
        assert!(matches!(err, PkiError::Backend { .. }));
    }
}
