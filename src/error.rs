// Oneauth — Top-level error types
//
// Aggregates errors from the store module into a single error enum for the
// application boundary. Maintenance passes deliberately do not surface here:
// they report typed outcomes to the orchestrator instead of propagating.

use thiserror::Error;

/// Top-level error type for all oneauth operations.
#[derive(Debug, Error)]
pub enum OneAuthError {
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, OneAuthError>;
