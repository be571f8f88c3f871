//! Transactional JSON document store.
//!
//! Documents are JSON files beneath a root directory, shared by concurrent
//! request handlers (threads or processes). This crate makes every
//! read-modify-write cycle on one document atomic, durable, and recoverable.
//!
//! # Guarantees
//!
//! 1. Updates to one document are serialized by an exclusive lock on
//!    `<path>.lock`, acquired with a bounded wait.
//! 2. Commits write `<path>.tmp.<random>`, re-read and decode it, then
//!    rename it over the primary path. Readers see the old or the new
//!    content, never a mix.
//! 3. Before each commit the previous content is copied into the configured
//!    backup tiers (see `dv-retention`).
//! 4. A primary file that no longer decodes is recovered from the newest
//!    readable snapshot; the corrupt bytes are parked in
//!    `<backup_dir>/<prefix>.corrupt` on the next commit.
//! 5. Change notifications are fire-and-forget and never fail a commit.
//!
//! # Layout
//!
//! ```text
//! <root>/campaigns/grid.json                       primary document
//! <root>/campaigns/grid.json.lock                  exclusive lock handle
//! <root>/campaigns/backups/grid.json_recent.json  single-slot tier
//! <root>/campaigns/backups/grid.json_session_2.json
//! <root>/campaigns/backups/grid.json_daily_2024-03-01.json
//! ```

pub mod backup;
pub mod config;
pub mod error;
mod lock;
pub mod mutation;
pub mod notify;
pub mod store;

pub use backup::SnapshotInfo;
pub use config::{LockConfig, StoreConfig};
pub use error::{BoxError, StoreError, StoreResult};
pub use mutation::{BackupScope, Mutation, UpdateOptions};
pub use notify::{BroadcastSink, ChangeEvent, ChangeSink, NoopSink, RecordingSink};
pub use store::DocumentStore;

// Re-export the types callers need to name documents and slots.
pub use dv_retention::{SlotId, TierSpec};
pub use dv_types::DocumentId;
