use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid document id {id:?}: {reason}")]
    InvalidDocumentId { id: String, reason: String },
}
