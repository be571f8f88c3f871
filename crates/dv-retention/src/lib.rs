//! Tiered backup retention for docvault.
//!
//! A document's prior states are kept in independent tiers, each with its own
//! cap and slot strategy. This crate only decides: which slot a new snapshot
//! goes into, and which slots must be evicted. It never touches the
//! filesystem.
//!
//! # Slot Strategies
//!
//! - [`SlotStrategy::Single`]: one slot, overwritten by every snapshot
//! - [`SlotStrategy::RoundRobin`]: up to `cap` numbered slots; when full the
//!   oldest slot is overwritten in place
//! - [`SlotStrategy::Calendar`]: one slot per calendar period; the oldest
//!   period is evicted once the cap is exceeded
//!
//! Ties on modification time break toward the lexicographically smallest
//! slot identifier.

pub mod error;
pub mod policy;
pub mod tier;

pub use error::{RetentionError, RetentionResult};
pub use policy::{Placement, RetentionPolicy, SlotMember};
pub use tier::{CalendarPeriod, SlotId, SlotStrategy, TierSpec};
