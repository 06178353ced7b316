//! Store error types.

use thiserror::Error;

use crate::resource::{Kind, ObjectKey};

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Object not found.
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    /// An object with the same identity already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Version mismatch (optimistic concurrency control).
    #[error("conflict on {kind} {key}: expected version {expected}, got {actual}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// The store returned an object of another kind than requested.
    #[error("expected {expected} for {key}, store returned {found}")]
    UnexpectedKind {
        expected: Kind,
        found: Kind,
        key: ObjectKey,
    },

    /// Store temporarily unreachable or throttling.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a fresh attempt may succeed without outside intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Unavailable(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
