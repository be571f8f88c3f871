//! On-disk backup slots for one document.
//!
//! Snapshots live at `<backup_dir>/<prefix>_<slot>.json`, where `<prefix>` is
//! the document's full file name. A snapshot's file modification time is its
//! creation timestamp: the store sets it explicitly from its clock after
//! writing, and the retention policy orders slots by it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use dv_retention::{RetentionPolicy, SlotId, SlotMember};
use serde::Serialize;
use tracing::debug;

/// A snapshot present in a document's backup directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub tier: String,
    pub slot: SlotId,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub len: u64,
}

impl SnapshotInfo {
    pub(crate) fn member(&self) -> SlotMember {
        SlotMember::new(self.slot.clone(), self.modified)
    }
}

/// The backup slots belonging to one document.
#[derive(Clone, Debug)]
pub(crate) struct BackupSet {
    dir: PathBuf,
    prefix: String,
}

impl BackupSet {
    pub(crate) fn new(dir: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            dir,
            prefix: prefix.into(),
        }
    }

    pub(crate) fn path_of(&self, slot: &SlotId) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.prefix, slot))
    }

    /// Where corrupt primary content is parked before being replaced.
    pub(crate) fn quarantine_path(&self) -> PathBuf {
        self.dir.join(format!("{}.corrupt", self.prefix))
    }

    /// Every snapshot of this document that belongs to a configured tier,
    /// newest first.
    pub(crate) fn list(&self, policy: &RetentionPolicy) -> io::Result<Vec<SnapshotInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(slot) = name.to_str().and_then(|n| self.slot_of(n)) else {
                continue;
            };
            let Some(tier) = policy.tier_of(slot) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            snapshots.push(SnapshotInfo {
                tier: tier.name.clone(),
                slot: SlotId::new(slot),
                path: entry.path(),
                modified: DateTime::<Utc>::from(meta.modified()?),
                len: meta.len(),
            });
        }
        snapshots.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.slot.cmp(&b.slot)));
        Ok(snapshots)
    }

    /// Write `content` into `slot`, replacing it atomically, and stamp the
    /// file with `at`.
    pub(crate) fn write(
        &self,
        slot: &SlotId,
        content: &[u8],
        at: DateTime<Utc>,
        durable: bool,
    ) -> io::Result<PathBuf> {
        let target = self.path_of(slot);
        self.write_file(&target, content, Some(at), durable)?;
        debug!(path = %target.display(), bytes = content.len(), "snapshot written");
        Ok(target)
    }

    /// Park unreadable primary content so it is not lost on commit.
    pub(crate) fn quarantine(&self, content: &[u8], durable: bool) -> io::Result<PathBuf> {
        let target = self.quarantine_path();
        self.write_file(&target, content, None, durable)?;
        Ok(target)
    }

    pub(crate) fn read(&self, slot: &SlotId) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_of(slot)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a slot. Returns `true` if it existed.
    pub(crate) fn remove(&self, slot: &SlotId) -> io::Result<bool> {
        match fs::remove_file(self.path_of(slot)) {
            Ok(()) => {
                debug!(slot = %slot, "snapshot evicted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn slot_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".json")
    }

    fn write_file(
        &self,
        target: &Path,
        content: &[u8],
        modified: Option<DateTime<Utc>>,
        durable: bool,
    ) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = crate::store::temp_path(target);
        let result = replace_file(&tmp, target, content, modified, durable);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Write `content` to `tmp`, then rename it over `target`.
fn replace_file(
    tmp: &Path,
    target: &Path,
    content: &[u8],
    modified: Option<DateTime<Utc>>,
    durable: bool,
) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    file.write_all(content)?;
    if let Some(at) = modified {
        file.set_modified(SystemTime::from(at))?;
    }
    if durable {
        file.sync_all()?;
    }
    drop(file);
    fs::rename(tmp, target)?;
    if durable {
        if let Some(dir) = target.parent() {
            sync_dir(dir)?;
        }
    }
    Ok(())
}

/// Flush a directory entry table so a rename survives power loss.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
