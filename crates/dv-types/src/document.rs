//! Document identifiers.
//!
//! A [`DocumentId`] is the stable key of a stored document: a relative,
//! `/`-separated path beneath the store root. Valid identifiers:
//! - Must be non-empty and relative (no leading `/`)
//! - Must not contain `\`, NUL, or empty, `.` or `..` components
//! - Must not end with `.lock` or `.editing` (reserved for lock files)
//! - Must not contain `.tmp.` (reserved for in-flight commits)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Suffixes the store and the edit-lock registry append to a document path.
const RESERVED_SUFFIXES: &[&str] = &[".lock", ".editing"];

/// Infix used by temporary commit files.
const TEMP_INFIX: &str = ".tmp.";

/// Identity of a persisted JSON document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap a document path.
    ///
    /// # Examples
    ///
    /// ```
    /// use dv_types::DocumentId;
    ///
    /// assert!(DocumentId::new("campaigns/grid.json").is_ok());
    /// assert!(DocumentId::new("../escape.json").is_err());
    /// assert!(DocumentId::new("state.json.lock").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// The identifier as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path component, e.g. `grid.json`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The parent path, if the document lives in a subdirectory.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Prefix used for this document's backup files: the full file name
    /// (`grid.json` -> `grid.json_recent.json`), so documents sharing a stem
    /// in one directory never share backups.
    pub fn backup_prefix(&self) -> &str {
        self.file_name()
    }

    /// Path components, e.g. `["campaigns", "grid.json"]`.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Resolve the document's primary file beneath `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.components().fold(root.to_path_buf(), |path, part| path.join(part))
    }
}

fn validate(id: &str) -> Result<(), TypeError> {
    let reject = |reason: &str| {
        Err(TypeError::InvalidDocumentId {
            id: id.to_string(),
            reason: reason.to_string(),
        })
    };

    if id.is_empty() {
        return reject("must not be empty");
    }
    if id.starts_with('/') {
        return reject("must be relative to the store root");
    }
    if id.contains('\\') || id.contains('\0') {
        return reject("contains a forbidden character");
    }
    for part in id.split('/') {
        match part {
            "" => return reject("contains an empty path component"),
            "." | ".." => return reject("must not contain '.' or '..' components"),
            _ => {}
        }
    }
    if let Some(suffix) = RESERVED_SUFFIXES.iter().find(|s| id.ends_with(**s)) {
        return reject(&format!("must not end with '{suffix}'"));
    }
    if id.contains(TEMP_INFIX) {
        return reject("must not contain '.tmp.'");
    }
    Ok(())
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
