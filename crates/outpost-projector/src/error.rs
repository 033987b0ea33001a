//! Error types for the projector.
//!
//! Decode failures and publish rejections are resolved against their rows
//! inside the cycle and never surface here; only infrastructure errors
//! propagate to the outer loop.

use outpost_database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectorError {
    /// Storage failure while claiming or resolving rows
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias using ProjectorError.
pub type ProjectorResult<T> = Result<T, ProjectorError>;
