use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dv_codec::DocumentCodec;
use dv_retention::{RetentionPolicy, SlotId, TierSpec};
use dv_types::{Clock, DocumentId, SystemClock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backup::{sync_dir, BackupSet, SnapshotInfo};
use crate::config::StoreConfig;
use crate::error::{BoxError, StoreError, StoreResult};
use crate::lock::{self, LocalGate};
use crate::mutation::{BackupScope, Mutation, UpdateOptions};
use crate::notify::{ChangeEvent, ChangeSink, NoopSink};

/// Unique sibling path for an in-flight write: `<path>.tmp.<random hex>`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".tmp.{:016x}", rand::random::<u64>()));
    PathBuf::from(name)
}

/// What is currently stored for a document.
enum Current {
    Missing,
    Valid {
        value: Value,
        bytes: Vec<u8>,
    },
    /// The primary file does not decode. `recovered` holds the newest
    /// snapshot that does, if any.
    Corrupt {
        bytes: Vec<u8>,
        recovered: Option<(SlotId, Value)>,
        attempted: usize,
    },
}

/// Transactional store of JSON documents on a local filesystem.
///
/// Writers are serialized per document by an exclusive lock on
/// `<path>.lock`; readers take no lock and rely on commits being atomic
/// renames. Before each commit, the previous content is copied into the
/// configured backup tiers.
///
/// Lifecycle of one [`update`](Self::update):
///
/// ```text
/// Idle -> Locking -> Loaded -> Mutated -> Aborted ----------------> Unlocked
///                                      \-> Committing -> Committed -/
/// ```
pub struct DocumentStore {
    config: StoreConfig,
    policy: RetentionPolicy,
    codec: DocumentCodec,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ChangeSink>,
    gate: LocalGate,
}

impl DocumentStore {
    /// Open a store, creating its root directory if needed.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let policy = config.retention_policy()?;
        fs::create_dir_all(&config.root)?;
        let codec = if config.pretty {
            DocumentCodec::new()
        } else {
            DocumentCodec::compact()
        };
        debug!(root = %config.root.display(), tiers = policy.tiers().len(), "document store opened");
        Ok(Self {
            config,
            policy,
            codec,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopSink),
            gate: LocalGate::default(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Path of the document's primary file.
    ///
    /// Fails for identifiers that reach into a backup directory.
    pub fn path_of(&self, id: &DocumentId) -> StoreResult<PathBuf> {
        self.check(id)?;
        Ok(self.primary_path(id))
    }

    fn primary_path(&self, id: &DocumentId) -> PathBuf {
        id.resolve(&self.config.root)
    }

    /// Reject ids whose path runs through (or is) a backup directory.
    fn check(&self, id: &DocumentId) -> StoreResult<()> {
        let reserved: Vec<&str> = self
            .config
            .backup_dir
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        if reserved.is_empty() {
            return Ok(());
        }
        let parts: Vec<&str> = id.components().collect();
        if parts.windows(reserved.len()).any(|w| w == reserved.as_slice()) {
            return Err(StoreError::ReservedPath {
                document: id.clone(),
                reserved: reserved.join("/"),
            });
        }
        Ok(())
    }

    /// Read a document without locking.
    ///
    /// A missing (or zero-length) file yields `default()`. A file that does
    /// not decode is recovered from the newest readable snapshot, trying the
    /// recovery tier first; if none decodes the call fails with
    /// [`StoreError::UnrecoverableCorruption`].
    pub fn load(&self, id: &DocumentId, default: impl FnOnce() -> Value) -> StoreResult<Value> {
        self.check(id)?;
        match self.read_current(id)? {
            Current::Missing => Ok(default()),
            Current::Valid { value, .. } => Ok(value),
            Current::Corrupt {
                recovered: Some((_, value)),
                ..
            } => Ok(value),
            Current::Corrupt {
                recovered: None,
                attempted,
                ..
            } => Err(StoreError::UnrecoverableCorruption {
                document: id.clone(),
                attempted,
            }),
        }
    }

    /// [`load`](Self::load) into a typed value.
    pub fn load_as<T: DeserializeOwned>(
        &self,
        id: &DocumentId,
        default: impl FnOnce() -> T,
    ) -> StoreResult<T> {
        let mut missing = false;
        let value = self.load(id, || {
            missing = true;
            Value::Null
        })?;
        if missing {
            return Ok(default());
        }
        serde_json::from_value(value).map_err(|e| StoreError::Shape {
            document: id.clone(),
            reason: e.to_string(),
        })
    }

    /// Run a read-modify-write transaction on one document.
    ///
    /// `mutate` receives an owned copy of the current value (or
    /// `options.default`) and decides whether to commit. An error from
    /// `mutate`, an unencodable result, or any I/O failure leaves the primary
    /// file untouched. The lock is released on every exit path, including a
    /// panic inside `mutate`.
    pub fn update<R, E, F>(
        &self,
        id: &DocumentId,
        options: &UpdateOptions,
        mutate: F,
    ) -> StoreResult<R>
    where
        F: FnOnce(Value) -> Result<Mutation<R>, E>,
        E: Into<BoxError>,
    {
        let tiers = self.scoped_tiers(&options.scope)?;
        let path = self.path_of(id)?;
        let backups = self.backups_for(id);

        let guard = lock::acquire(
            &self.gate,
            id,
            lock::lock_path(&path),
            &self.config.lock,
            options.deadline,
        )?;

        let (value, previous, corrupt) = match self.read_current(id)? {
            Current::Missing => (options.default.clone(), None, None),
            Current::Valid { value, bytes } => (value, Some(bytes), None),
            Current::Corrupt {
                bytes,
                recovered,
                attempted,
            } => {
                let value = match recovered {
                    Some((slot, value)) => {
                        info!(document = %id, slot = %slot, "updating from recovered snapshot");
                        value
                    }
                    None => {
                        warn!(
                            document = %id,
                            attempted,
                            "no readable snapshot; updating from the default value"
                        );
                        options.default.clone()
                    }
                };
                (value, None, Some(bytes))
            }
        };

        let (document, output) = match mutate(value).map_err(|e| StoreError::Mutation(e.into()))? {
            Mutation::Keep { output } => {
                debug!(document = %id, "mutation kept the document unchanged");
                return Ok(output);
            }
            Mutation::Commit { document, output } => (document, output),
        };

        let bytes = self
            .codec
            .encode(&document)
            .map_err(|e| StoreError::Unencodable {
                document: id.clone(),
                reason: e.to_string(),
            })?;

        let now = self.clock.now();
        let durable = self.config.durable;
        let mut snapshots = 0;
        if let Some(previous) = &previous {
            snapshots = self.snapshot(&backups, &tiers, previous, now)?;
        }
        if let Some(corrupt) = &corrupt {
            let parked = backups.quarantine(corrupt, durable)?;
            warn!(document = %id, path = %parked.display(), "corrupt content moved aside before commit");
        }

        self.commit(id, &path, &bytes)?;
        drop(guard);

        info!(document = %id, bytes = bytes.len(), snapshots, "document committed");
        self.notify(ChangeEvent::new(id.clone(), options.event.clone(), now));
        Ok(output)
    }

    /// Snapshots of a document, newest first.
    pub fn list_snapshots(&self, id: &DocumentId) -> StoreResult<Vec<SnapshotInfo>> {
        self.check(id)?;
        Ok(self.backups_for(id).list(&self.policy)?)
    }

    /// Decode the snapshot held in `slot`.
    pub fn read_snapshot(&self, id: &DocumentId, slot: &SlotId) -> StoreResult<Value> {
        let not_found = || StoreError::SnapshotNotFound {
            document: id.clone(),
            slot: slot.clone(),
        };
        self.check(id)?;
        if self.policy.tier_of(slot.as_str()).is_none() {
            return Err(not_found());
        }
        let bytes = self.backups_for(id).read(slot)?.ok_or_else(not_found)?;
        self.codec
            .decode(&bytes)
            .map_err(|source| StoreError::MalformedDocument {
                document: id.clone(),
                source,
            })
    }

    /// Replace the document with a snapshot's content.
    ///
    /// This is an ordinary commit, so the content being replaced is itself
    /// snapshotted first.
    pub fn restore(&self, id: &DocumentId, slot: &SlotId, options: &UpdateOptions) -> StoreResult<()> {
        let value = self.read_snapshot(id, slot)?;
        info!(document = %id, slot = %slot, "restoring snapshot");
        self.update(id, options, |_| Ok::<_, BoxError>(Mutation::save(value)))
    }

    /// Delete snapshots beyond each tier's cap. Idempotent.
    pub fn prune(&self, id: &DocumentId) -> StoreResult<Vec<SlotId>> {
        let path = self.path_of(id)?;
        let _guard = lock::acquire(&self.gate, id, lock::lock_path(&path), &self.config.lock, None)?;

        let backups = self.backups_for(id);
        let members: Vec<_> = backups.list(&self.policy)?.iter().map(SnapshotInfo::member).collect();
        let mut removed = Vec::new();
        for tier in self.policy.tiers() {
            for slot in self.policy.excess(&tier.name, &members)? {
                if backups.remove(&slot)? {
                    removed.push(slot);
                }
            }
        }
        if !removed.is_empty() {
            info!(document = %id, removed = removed.len(), "pruned snapshots");
        }
        Ok(removed)
    }

    fn scoped_tiers(&self, scope: &BackupScope) -> StoreResult<Vec<&TierSpec>> {
        match scope {
            BackupScope::All => Ok(self.policy.tiers().iter().collect()),
            BackupScope::Only(names) if names.is_empty() => Err(StoreError::EmptyBackupScope),
            BackupScope::Only(names) => names
                .iter()
                .map(|name| self.policy.tier(name).map_err(StoreError::from))
                .collect(),
        }
    }

    fn backups_for(&self, id: &DocumentId) -> BackupSet {
        let path = self.primary_path(id);
        let parent = path.parent().unwrap_or(&self.config.root);
        BackupSet::new(self.config.backup_dir_in(parent), id.backup_prefix())
    }

    fn read_current(&self, id: &DocumentId) -> StoreResult<Current> {
        let path = self.primary_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Current::Missing),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            debug!(document = %id, "primary file is empty; treating as missing");
            return Ok(Current::Missing);
        }

        let error = match self.codec.decode(&bytes) {
            Ok(value) => return Ok(Current::Valid { value, bytes }),
            Err(e) => e,
        };
        warn!(document = %id, error = %error, "primary file does not decode; trying snapshots");

        let backups = self.backups_for(id);
        let candidates = self.recovery_order(backups.list(&self.policy)?);
        let attempted = candidates.len();
        for snapshot in candidates {
            let Some(snap_bytes) = backups.read(&snapshot.slot)? else {
                continue;
            };
            match self.codec.decode(&snap_bytes) {
                Ok(value) => {
                    warn!(document = %id, slot = %snapshot.slot, "recovered from snapshot");
                    return Ok(Current::Corrupt {
                        bytes,
                        recovered: Some((snapshot.slot, value)),
                        attempted,
                    });
                }
                Err(e) => {
                    debug!(document = %id, slot = %snapshot.slot, error = %e, "snapshot does not decode");
                }
            }
        }

        Ok(Current::Corrupt {
            bytes,
            recovered: None,
            attempted,
        })
    }

    /// Recovery tier first (newest first), then every other snapshot newest
    /// first. `snapshots` arrives sorted newest first.
    fn recovery_order(&self, snapshots: Vec<SnapshotInfo>) -> Vec<SnapshotInfo> {
        let (mut ordered, rest): (Vec<_>, Vec<_>) = snapshots
            .into_iter()
            .partition(|s| s.tier == self.config.recovery_tier);
        ordered.extend(rest);
        ordered
    }

    /// Copy the pre-update bytes into each tier. Returns the number written.
    fn snapshot(
        &self,
        backups: &BackupSet,
        tiers: &[&TierSpec],
        content: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let members: Vec<_> = backups.list(&self.policy)?.iter().map(SnapshotInfo::member).collect();
        for tier in tiers {
            let placement = self.policy.place_snapshot(&tier.name, &members, now)?;
            backups.write(&placement.slot, content, now, self.config.durable)?;
            for slot in &placement.evict {
                backups.remove(slot)?;
            }
        }
        Ok(tiers.len())
    }

    /// Write to a temp sibling, verify it, then rename over the primary.
    fn commit(&self, id: &DocumentId, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let dir = path.parent().unwrap_or(&self.config.root);
        fs::create_dir_all(dir)?;
        let tmp = temp_path(path);
        let result = self.write_verified(id, &tmp, path, bytes);
        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
                }
            }
        }
        result
    }

    fn write_verified(&self, id: &DocumentId, tmp: &Path, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
        file.write_all(bytes)?;
        if self.config.durable {
            file.sync_all()?;
        }
        drop(file);

        let written = fs::read(tmp)?;
        if written != bytes || self.codec.decode(&written).is_err() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("temp file for {id} failed verification"),
            )));
        }

        fs::rename(tmp, path)?;
        if self.config.durable {
            if let Some(dir) = path.parent() {
                sync_dir(dir)?;
            }
        }
        Ok(())
    }

    fn notify(&self, event: ChangeEvent) {
        if let Err(e) = self.sink.notify(&event) {
            warn!(document = %event.document, event = %event.event, error = %e, "change notification failed");
        }
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("root", &self.config.root)
            .field("tiers", &self.policy.tiers().len())
            .finish()
    }
}
