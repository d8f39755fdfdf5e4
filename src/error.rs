use std::fmt;
use thiserror::Error;

/// Result type for fileencryption operations
pub type Result<T> = std::result::Result<T, Error>;

/// The KMS call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsOperation {
    /// Wrapping a key with a master key
    Wrap,
    /// Unwrapping a key previously wrapped with a master key
    Unwrap,
}

impl fmt::Display for KmsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KmsOperation::Wrap => write!(f, "wrap"),
            KmsOperation::Unwrap => write!(f, "unwrap"),
        }
    }
}

/// Errors that can occur in the fileencryption library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or contradictory configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A wrap or unwrap call against the KMS failed
    #[error("KMS {operation} failed for master key '{master_key_id}': {message}")]
    Kms {
        operation: KmsOperation,
        master_key_id: String,
        message: String,
    },

    /// Errors reported by a KMS client implementation
    #[error("KMS service error: {0}")]
    KmsService(String),

    /// Malformed or missing stored key material
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// Errors related to local cryptographic operations
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Errors related to JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps a failure returned by a KMS client with the operation and master key it concerned
    pub(crate) fn kms(operation: KmsOperation, master_key_id: &str, cause: Error) -> Self {
        Error::Kms {
            operation,
            master_key_id: master_key_id.to_string(),
            message: cause.to_string(),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Internal(err.to_string())
    }
}
