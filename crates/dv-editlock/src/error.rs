//! Error types for editing lock operations.

use thiserror::Error;

/// Errors that can occur while recording or reading editing locks.
#[derive(Debug, Error)]
pub enum EditLockError {
    /// The holder identity cannot be recorded.
    #[error("invalid holder {holder:?}: {reason}")]
    InvalidHolder { holder: String, reason: String },

    /// A marker could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An in-memory registry's lock was poisoned by a panicking writer.
    #[error("registry poisoned: {0}")]
    Poisoned(String),

    /// I/O error during marker file operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for editing lock operations.
pub type Result<T> = std::result::Result<T, EditLockError>;
