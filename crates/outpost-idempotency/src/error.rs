//! Error types for idempotency operations.

use outpost_database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// The key was reused with a different request fingerprint
    #[error("idempotency key '{key}' reused with a different request fingerprint")]
    Conflict { key: String },

    /// Storage failure
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias using IdempotencyError.
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;
