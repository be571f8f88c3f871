//! Editing lock records and registry configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dv_types::DocumentId;
use serde::{Deserialize, Serialize};

use crate::error::{EditLockError, Result};

const MAX_HOLDER_LEN: usize = 128;

/// A live claim that `holder` is editing `document`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub document: DocumentId,
    /// Free-form identity shown to other editors, e.g. a user name.
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    /// First instant at which the record reads as absent.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(
        document: DocumentId,
        holder: impl Into<String>,
        acquired_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            document,
            holder: holder.into(),
            acquired_at,
            expires_at: expiry(acquired_at, ttl),
        }
    }

    /// How long the holder has been editing, as seen at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.acquired_at
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder == holder
    }

    /// `true` until `now` reaches `expires_at`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Settings shared by every registry backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditLockConfig {
    /// How long an acquisition stays visible.
    #[serde(with = "dv_types::millis")]
    pub ttl: Duration,
}

impl Default for EditLockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
        }
    }
}

/// Validate a holder identity.
///
/// Holders must be non-empty, at most 128 characters, free of control
/// characters, and without surrounding whitespace.
pub fn validate_holder(holder: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(EditLockError::InvalidHolder {
            holder: holder.to_string(),
            reason: reason.to_string(),
        })
    };

    if holder.is_empty() {
        return invalid("holder cannot be empty");
    }
    if holder.chars().count() > MAX_HOLDER_LEN {
        return invalid("holder is longer than 128 characters");
    }
    if holder.trim() != holder {
        return invalid("holder cannot start or end with whitespace");
    }
    if holder.chars().any(char::is_control) {
        return invalid("holder cannot contain control characters");
    }
    Ok(())
}

/// `acquired_at + ttl`, saturating at the end of representable time.
pub(crate) fn expiry(acquired_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| acquired_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn expiry_boundary() {
        let info = LockInfo::new(
            DocumentId::new("doc1").unwrap(),
            "alice",
            t(),
            Duration::from_secs(30),
        );
        assert_eq!(info.expires_at, t() + chrono::Duration::seconds(30));
        assert!(info.is_live(t() + chrono::Duration::milliseconds(29_999)));
        assert!(!info.is_live(info.expires_at));
        assert_eq!(info.age(t() + chrono::Duration::seconds(7)).num_seconds(), 7);
        assert!(info.is_held_by("alice"));
        assert!(!info.is_held_by("Alice"));
    }

    #[test]
    fn holder_names() {
        assert!(validate_holder("alice").is_ok());
        assert!(validate_holder("Alice Smith (laptop)").is_ok());
        assert!(validate_holder("").is_err());
        assert!(validate_holder(" alice").is_err());
        assert!(validate_holder("al\nice").is_err());
        assert!(validate_holder(&"x".repeat(129)).is_err());
    }

    #[test]
    fn config_ttl_in_millis() {
        let config: EditLockConfig = toml::from_str("ttl = 1500").unwrap();
        assert_eq!(config.ttl, Duration::from_millis(1500));
        let config: EditLockConfig = toml::from_str("").unwrap();
        assert_eq!(config, EditLockConfig::default());
    }
}
