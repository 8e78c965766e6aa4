use std::fmt;

use cred_reconcile::{DiffError, GuardrailViolation};
use cred_remote::RemoteError;

/// Why a whole pass failed.
///
/// Per-entity failures never surface here; they are counted in the report.
#[derive(Debug)]
pub enum SyncError {
    /// The planned mutation set was rejected before any remote write.
    Guardrail(GuardrailViolation),
    /// A remote call the rest of the pass depends on failed.
    Remote {
        context: String,
        source: RemoteError,
    },
    /// The remote answer cannot be trusted (count drift, empty collection,
    /// unsupported pagination, ambiguous singleton).
    Consistency(String),
    /// Local persistence failed.
    Store(anyhow::Error),
    /// Another pass for the same system holds the lease.
    AlreadyRunning { system: String },
}

impl SyncError {
    pub(crate) fn remote(context: impl Into<String>, source: RemoteError) -> Self {
        SyncError::Remote {
            context: context.into(),
            source,
        }
    }

    /// Stable category label for logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Guardrail(_) => "guardrail",
            SyncError::Remote { .. } => "remote",
            SyncError::Consistency(_) => "consistency",
            SyncError::Store(_) => "store",
            SyncError::AlreadyRunning { .. } => "already_running",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Guardrail(v) => write!(f, "{v}"),
            SyncError::Remote { context, source } => write!(f, "{context}: {source}"),
            SyncError::Consistency(msg) => write!(f, "remote consistency check failed: {msg}"),
            SyncError::Store(e) => write!(f, "local store error: {e:#}"),
            SyncError::AlreadyRunning { system } => {
                write!(f, "a {system} sync pass is already running")
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Guardrail(v) => Some(v),
            SyncError::Remote { source, .. } => Some(source),
            SyncError::Store(e) => Some(e.as_ref()),
            SyncError::Consistency(_) | SyncError::AlreadyRunning { .. } => None,
        }
    }
}

impl From<GuardrailViolation> for SyncError {
    fn from(v: GuardrailViolation) -> Self {
        SyncError::Guardrail(v)
    }
}

/// A duplicated natural key is a malformed plan.
impl From<DiffError> for SyncError {
    fn from(e: DiffError) -> Self {
        let key = match e {
            DiffError::DuplicateLocalKey { key } | DiffError::DuplicateRemoteKey { key } => key,
        };
        SyncError::Guardrail(GuardrailViolation::DuplicateKey { key })
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Store(e)
    }
}
