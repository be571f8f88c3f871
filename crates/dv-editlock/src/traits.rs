//! The [`EditLockRegistry`] trait.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dv_types::DocumentId;

use crate::error::Result;
use crate::types::LockInfo;

/// Storage backend for advisory editing locks.
///
/// Every operation takes the caller's notion of `now`, so expiry is decided
/// by the caller's clock and is trivially testable.
pub trait EditLockRegistry: Send + Sync {
    /// How long an acquisition stays visible.
    fn ttl(&self) -> Duration;

    /// Record that `holder` is editing `document` as of `now`.
    ///
    /// Always succeeds for a valid holder, replacing any existing record.
    fn acquire(&self, document: &DocumentId, holder: &str, now: DateTime<Utc>) -> Result<LockInfo>;

    /// The live record for `document`, or `None` if there is none or it has
    /// expired (`now - acquired_at >= ttl`).
    fn inspect(&self, document: &DocumentId, now: DateTime<Utc>) -> Result<Option<LockInfo>>;

    /// Drop the record for `document` if `holder` owns it.
    ///
    /// Returns `Ok(true)` if a record was removed.
    fn release(&self, document: &DocumentId, holder: &str) -> Result<bool>;

    /// Every live record, ordered by document.
    fn active(&self, now: DateTime<Utc>) -> Result<Vec<LockInfo>>;

    /// The live record for `document` if someone other than `holder` owns it.
    ///
    /// This is the question an editor asks before opening a document.
    fn held_by_other(
        &self,
        document: &DocumentId,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LockInfo>> {
        Ok(self
            .inspect(document, now)?
            .filter(|info| !info.is_held_by(holder)))
    }
}
