use std::io;
use std::time::Duration;

use dv_codec::CodecError;
use dv_retention::{RetentionError, SlotId};
use dv_types::{DocumentId, TypeError};

/// Boxed error returned by caller-supplied mutations and change sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from document store operations.
///
/// Every error is local to the call that produced it: a failed update leaves
/// the primary file as it was.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document identifier is not a valid storage path.
    #[error("invalid document id: {0}")]
    InvalidDocumentId(#[from] TypeError),

    /// The identifier is valid but names a path the store owns, such as a
    /// backup directory.
    #[error("document {document} is inside reserved path {reserved:?}")]
    ReservedPath { document: DocumentId, reserved: String },

    /// A document or snapshot does not parse as JSON.
    #[error("malformed document {document}: {source}")]
    MalformedDocument {
        document: DocumentId,
        #[source]
        source: CodecError,
    },

    /// The primary file and every snapshot failed to decode.
    #[error("document {document} is corrupt and none of its {attempted} snapshots decode")]
    UnrecoverableCorruption {
        document: DocumentId,
        attempted: usize,
    },

    /// The mutation produced a value that cannot be written as JSON.
    #[error("cannot encode document {document}: {reason}")]
    Unencodable { document: DocumentId, reason: String },

    /// The exclusive lock could not be taken within the retry budget.
    #[error("timed out waiting for the lock on {document} after {attempts} attempts ({waited:?})")]
    LockTimeout {
        document: DocumentId,
        attempts: u32,
        waited: Duration,
    },

    /// The decoded document does not have the requested shape.
    #[error("document {document} does not match the expected shape: {reason}")]
    Shape { document: DocumentId, reason: String },

    /// The caller's mutation returned an error.
    #[error("mutation rejected: {0}")]
    Mutation(#[source] BoxError),

    /// No snapshot exists in the named slot.
    #[error("no snapshot {slot} for {document}")]
    SnapshotNotFound { document: DocumentId, slot: SlotId },

    /// An update asked for backups in no tier at all.
    #[error("backup scope must name at least one tier")]
    EmptyBackupScope,

    /// Tier lookup or tier configuration failure.
    #[error("retention error: {0}")]
    Retention(#[from] RetentionError),

    /// The store configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem read, write, rename, or permission failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
