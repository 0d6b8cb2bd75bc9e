//! Error types for Tollgate.

use thiserror::Error;

/// Errors raised by the counter, feature and cache stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a write, e.g. a missing parent row
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// A cached value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store errors that escaped a component boundary
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
