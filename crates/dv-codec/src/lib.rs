//! JSON document codec for docvault.
//!
//! The codec is pure: it turns bytes into a [`serde_json::Value`] tree and
//! back, and reports why when it cannot. Validity of a document means
//! "parses as JSON"; no schema is enforced here.

pub mod codec;
pub mod error;

pub use codec::DocumentCodec;
pub use error::{CodecError, CodecResult};
