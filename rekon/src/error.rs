//! Reconciliation errors.

use thiserror::Error;

use crate::fingerprint::FingerprintError;
use crate::resource::ObjectKey;
use crate::store::StoreError;

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Object store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A desired description could not be fingerprinted.
    #[error("fingerprint computation failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// A one-shot job reported failure. Never retried automatically.
    #[error("job {job} failed, check the job logs")]
    JobFailed { job: ObjectKey },
}

impl ReconcileError {
    /// Whether the trigger mechanism may simply retry the pass.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_transient(),
            ReconcileError::Fingerprint(_) | ReconcileError::JobFailed { .. } => false,
        }
    }
}
