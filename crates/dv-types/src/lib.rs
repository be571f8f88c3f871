//! Foundation types for docvault.
//!
//! Every other docvault crate depends on `dv-types`.
//!
//! # Key Types
//!
//! - [`DocumentId`] — Validated, relative storage path naming a JSON document
//! - [`Clock`] — Source of wall-clock time, swappable in tests
//! - [`SystemClock`] / [`ManualClock`] — The two clock implementations
//! - [`millis`] — Serde adapter for millisecond durations in config files

pub mod clock;
pub mod document;
pub mod error;
pub mod millis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::DocumentId;
pub use error::TypeError;
