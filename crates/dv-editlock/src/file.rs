//! Marker-file editing lock registry.
//!
//! Each record lives beside its document as `<root>/<document>.editing`,
//! holding `{"holder": ..., "acquired_at": ...}`. Markers are replaced by
//! writing a uniquely named temp file and renaming it into place, so a
//! reader never sees half a marker. A marker that cannot be read or decoded
//! is treated as absent.
//!
//! These markers are unrelated to the store's `<document>.lock` handles.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dv_types::DocumentId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{EditLockError, Result};
use crate::traits::EditLockRegistry;
use crate::types::{validate_holder, EditLockConfig, LockInfo};

const MARKER_SUFFIX: &str = ".editing";

/// On-disk marker content.
#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// An [`EditLockRegistry`] shared by every process that can see `root`.
#[derive(Clone, Debug)]
pub struct FileEditLocks {
    root: PathBuf,
    ttl: Duration,
}

impl FileEditLocks {
    pub fn new(root: impl Into<PathBuf>, config: &EditLockConfig) -> Self {
        Self {
            root: root.into(),
            ttl: config.ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marker path for `document`.
    pub fn marker_path(&self, document: &DocumentId) -> PathBuf {
        let mut name = document.resolve(&self.root).into_os_string();
        name.push(MARKER_SUFFIX);
        PathBuf::from(name)
    }

    fn read_marker(&self, document: &DocumentId) -> Result<Option<LockInfo>> {
        let path = self.marker_path(document);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Marker>(&bytes) {
            Ok(marker) => Ok(Some(LockInfo::new(
                document.clone(),
                marker.holder,
                marker.acquired_at,
                self.ttl,
            ))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable editing marker");
                Ok(None)
            }
        }
    }

    fn write_marker(&self, path: &Path, marker: &Marker) -> Result<()> {
        let bytes = serde_json::to_vec(marker).map_err(|e| EditLockError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".tmp.{:016x}", rand::random::<u64>()));
        let tmp = PathBuf::from(tmp);

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .and_then(|mut file| file.write_all(&bytes))
            .and_then(|()| fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Document named by a marker found at `path`, if it is one.
    fn document_of(&self, path: &Path) -> Option<DocumentId> {
        let relative = path.strip_prefix(&self.root).ok()?.to_str()?;
        let document = relative.strip_suffix(MARKER_SUFFIX)?;
        let document = document.replace(std::path::MAIN_SEPARATOR, "/");
        DocumentId::new(document).ok()
    }
}

impl EditLockRegistry for FileEditLocks {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn acquire(&self, document: &DocumentId, holder: &str, now: DateTime<Utc>) -> Result<LockInfo> {
        validate_holder(holder)?;
        let marker = Marker {
            holder: holder.to_string(),
            acquired_at: now,
        };
        self.write_marker(&self.marker_path(document), &marker)?;
        debug!(document = %document, holder, "editing marker written");
        Ok(LockInfo::new(document.clone(), holder, now, self.ttl))
    }

    fn inspect(&self, document: &DocumentId, now: DateTime<Utc>) -> Result<Option<LockInfo>> {
        Ok(self.read_marker(document)?.filter(|info| info.is_live(now)))
    }

    fn release(&self, document: &DocumentId, holder: &str) -> Result<bool> {
        match self.read_marker(document)? {
            Some(info) if info.is_held_by(holder) => match fs::remove_file(self.marker_path(document)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
            _ => Ok(false),
        }
    }

    fn active(&self, now: DateTime<Utc>) -> Result<Vec<LockInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut live = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| {
                EditLockError::Io(e.into_io_error().unwrap_or_else(|| io::Error::other("walk failed")))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(document) = self.document_of(entry.path()) else {
                continue;
            };
            if let Some(info) = self.read_marker(&document)?.filter(|info| info.is_live(now)) {
                live.push(info);
            }
        }
        live.sort_by(|a, b| a.document.cmp(&b.document));
        Ok(live)
    }
}
