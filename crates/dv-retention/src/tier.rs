//! Tier definitions and slot naming.
//!
//! Slot identifiers are the part of a backup file name after the document
//! prefix: `recent`, `session_3`, `daily_2024-03-01`. The tier name always
//! leads, so a slot can be traced back to its tier without extra metadata.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RetentionError, RetentionResult};

/// Identifier of one backup slot within a document's backup set.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(slot: impl Into<String>) -> Self {
        Self(slot.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotId {
    fn from(slot: &str) -> Self {
        Self::new(slot)
    }
}

/// Calendar granularity for bucketed tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPeriod {
    Hour,
    Day,
    Month,
}

impl CalendarPeriod {
    /// The bucket key for an instant.
    pub fn key(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Hour => at.format("%Y-%m-%dT%H").to_string(),
            Self::Day => at.format("%Y-%m-%d").to_string(),
            Self::Month => at.format("%Y-%m").to_string(),
        }
    }

    /// Returns `true` if `key` is a bucket key of this period.
    pub fn is_key(&self, key: &str) -> bool {
        match self {
            Self::Hour => {
                NaiveDateTime::parse_from_str(&format!("{key}:00"), "%Y-%m-%dT%H:%M").is_ok()
            }
            Self::Day => NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok(),
            Self::Month => NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").is_ok(),
        }
    }
}

/// How snapshots are placed into a tier's slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotStrategy {
    /// A single slot named after the tier.
    Single,
    /// Numbered slots `<tier>_1 ..= <tier>_<cap>`.
    RoundRobin,
    /// One slot per calendar bucket, `<tier>_<key>`.
    Calendar { period: CalendarPeriod },
}

/// A named retention class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub cap: usize,
    pub strategy: SlotStrategy,
}

impl TierSpec {
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cap: 1,
            strategy: SlotStrategy::Single,
        }
    }

    pub fn round_robin(name: impl Into<String>, cap: usize) -> Self {
        Self {
            name: name.into(),
            cap,
            strategy: SlotStrategy::RoundRobin,
        }
    }

    pub fn calendar(name: impl Into<String>, period: CalendarPeriod, cap: usize) -> Self {
        Self {
            name: name.into(),
            cap,
            strategy: SlotStrategy::Calendar { period },
        }
    }

    /// The tiers used when none are configured: a `recent` slot refreshed on
    /// every commit, five rotating `session` slots, and two weeks of `daily`
    /// buckets.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::single("recent"),
            Self::round_robin("session", 5),
            Self::calendar("daily", CalendarPeriod::Day, 14),
        ]
    }

    /// Check that the tier can name slots unambiguously.
    ///
    /// Names are restricted to lowercase ASCII letters, digits and `-`, since
    /// `_` separates the tier name from the slot suffix.
    pub fn validate(&self) -> RetentionResult<()> {
        let invalid = |reason: &str| RetentionError::InvalidTier {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid("name may only contain a-z, 0-9 and '-'"));
        }
        if self.cap == 0 {
            return Err(invalid("cap must be at least 1"));
        }
        if self.strategy == SlotStrategy::Single && self.cap != 1 {
            return Err(invalid("single-slot tiers have a cap of exactly 1"));
        }
        Ok(())
    }

    /// Returns `true` if `slot` belongs to this tier.
    pub fn owns(&self, slot: &str) -> bool {
        match self.strategy {
            SlotStrategy::Single => slot == self.name,
            SlotStrategy::RoundRobin => self
                .suffix(slot)
                .and_then(|n| n.parse::<usize>().ok())
                .is_some_and(|n| n >= 1),
            SlotStrategy::Calendar { period } => {
                self.suffix(slot).is_some_and(|key| period.is_key(key))
            }
        }
    }

    /// Slot for round-robin position `n` (1-based).
    pub(crate) fn numbered_slot(&self, n: usize) -> SlotId {
        SlotId(format!("{}_{n}", self.name))
    }

    /// Slot for the calendar bucket containing `at`.
    pub(crate) fn bucket_slot(&self, period: CalendarPeriod, at: DateTime<Utc>) -> SlotId {
        SlotId(format!("{}_{}", self.name, period.key(at)))
    }

    fn suffix<'a>(&self, slot: &'a str) -> Option<&'a str> {
        slot.strip_prefix(self.name.as_str())?.strip_prefix('_')
    }
}
