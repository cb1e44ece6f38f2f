//! Error types for the object store

use kiln_core::Kind;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when talking to the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object with this key exists
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: Kind,
        namespace: String,
        name: String,
    },

    /// An object with this key already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: Kind,
        namespace: String,
        name: String,
    },

    /// The write carried a stale resource version
    #[error("{kind} {namespace}/{name} was modified concurrently (sent version {sent}, stored {stored})")]
    Conflict {
        kind: Kind,
        namespace: String,
        name: String,
        sent: u64,
        stored: u64,
    },

    /// The store returned an object of a different kind than requested
    #[error("expected a {expected} but got a {actual}")]
    KindMismatch { expected: Kind, actual: Kind },

    /// The object was rejected before being stored
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// The backend could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
