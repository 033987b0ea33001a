//! Bus error types.

use thiserror::Error;

/// Message bus error type.
#[derive(Error, Debug)]
pub enum BusError {
    /// HTTP transport error
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bus received the batch and refused it
    #[error("bus rejected the batch: {0}")]
    Rejected(String),

    /// Invalid bus endpoint configuration
    #[error("invalid bus endpoint: {0}")]
    Endpoint(String),
}

/// Result type alias using BusError.
pub type BusResult<T> = Result<T, BusError>;
