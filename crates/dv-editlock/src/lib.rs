//! Advisory editing locks for docvault.
//!
//! An editing lock records that someone is working on a document so other
//! editors can be warned. It is a courtesy signal, not a mutex:
//!
//! - [`EditLockRegistry::acquire`] always succeeds and replaces any existing
//!   record, expired or not.
//! - A record older than the configured TTL reads as absent.
//! - Nothing here is consulted by `dv-store`; an editing lock never blocks or
//!   fails a document update.
//!
//! # Modules
//!
//! - [`error`]: Error types for registry operations
//! - [`types`]: [`LockInfo`] and [`EditLockConfig`]
//! - [`traits`]: The [`EditLockRegistry`] trait
//! - [`memory`]: In-process [`InMemoryEditLocks`]
//! - [`file`]: [`FileEditLocks`], marker files shared between processes

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{EditLockError, Result};
pub use file::FileEditLocks;
pub use memory::InMemoryEditLocks;
pub use traits::EditLockRegistry;
pub use types::{validate_holder, EditLockConfig, LockInfo};
