use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CodecError, CodecResult};

/// UTF-8 byte order mark some editors prepend to hand-edited files.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Serializes and validates JSON documents.
///
/// Output is deterministic for a given value: `serde_json` keeps object keys
/// in sorted order, so the same tree always encodes to the same bytes.
#[derive(Clone, Copy, Debug)]
pub struct DocumentCodec {
    pretty: bool,
}

impl DocumentCodec {
    /// A codec emitting indented JSON.
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// A codec emitting compact single-line JSON.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Whether this codec indents its output.
    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Parse bytes into a value tree.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        self.decode_as(bytes)
    }

    /// Parse bytes directly into a typed value.
    pub fn decode_as<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed {
            line: e.line(),
            column: e.column(),
            reason: e.to_string(),
        })
    }

    /// Serialize a value to bytes, terminated by a newline.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| CodecError::Unencodable(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Returns `true` if the bytes decode to a value.
    pub fn validate(&self, bytes: &[u8]) -> bool {
        self.decode(bytes).is_ok()
    }
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new()
    }
}
