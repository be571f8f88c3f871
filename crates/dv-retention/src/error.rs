//! Error types for retention decisions.

use thiserror::Error;

/// Errors produced when configuring or consulting a retention policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionError {
    /// No tier with this name is configured.
    #[error("unknown backup tier: {0}")]
    UnknownTier(String),

    /// The tier definition is unusable.
    #[error("invalid backup tier {name}: {reason}")]
    InvalidTier { name: String, reason: String },

    /// Two tiers share a name.
    #[error("duplicate backup tier: {0}")]
    DuplicateTier(String),
}

/// Convenience type alias for retention operations.
pub type RetentionResult<T> = std::result::Result<T, RetentionError>;
