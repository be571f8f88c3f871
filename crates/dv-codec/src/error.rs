/// Errors from encoding or decoding a document.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not syntactically valid JSON.
    #[error("malformed document at line {line}, column {column}: {reason}")]
    Malformed {
        line: usize,
        column: usize,
        reason: String,
    },

    /// The value cannot be represented as JSON.
    #[error("value cannot be encoded as JSON: {0}")]
    Unencodable(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
