use std::path::{Path, PathBuf};
use std::time::Duration;

use dv_retention::{RetentionPolicy, TierSpec};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for a [`DocumentStore`](crate::DocumentStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory every [`DocumentId`](dv_types::DocumentId) resolves beneath.
    pub root: PathBuf,
    /// Backup directory, relative to each document's parent directory.
    pub backup_dir: PathBuf,
    /// Backup tiers, in the order snapshots are placed.
    pub tiers: Vec<TierSpec>,
    /// Tier consulted first when the primary file is corrupt.
    pub recovery_tier: String,
    /// Exclusive lock acquisition budget.
    pub lock: LockConfig,
    /// `fsync` files and directories before a commit returns.
    pub durable: bool,
    /// Write indented JSON.
    pub pretty: bool,
}

impl StoreConfig {
    /// Defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Build the retention policy, checking the tiers and the recovery tier.
    pub fn retention_policy(&self) -> StoreResult<RetentionPolicy> {
        if self.tiers.is_empty() {
            return Err(StoreError::Config("at least one backup tier is required".into()));
        }
        let policy = RetentionPolicy::new(self.tiers.clone())?;
        if policy.tier(&self.recovery_tier).is_err() {
            return Err(StoreError::Config(format!(
                "recovery tier {:?} is not a configured tier",
                self.recovery_tier
            )));
        }
        if self.lock.max_attempts == 0 {
            return Err(StoreError::Config("lock.max_attempts must be at least 1".into()));
        }
        Ok(policy)
    }

    /// Backup directory for documents living in `parent`.
    pub(crate) fn backup_dir_in(&self, parent: &Path) -> PathBuf {
        parent.join(&self.backup_dir)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            backup_dir: PathBuf::from("backups"),
            tiers: TierSpec::defaults(),
            recovery_tier: "recent".into(),
            lock: LockConfig::default(),
            durable: true,
            pretty: true,
        }
    }
}

/// Bounded retry budget for the exclusive document lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Attempts on the OS lock before giving up.
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(with = "dv_types::millis")]
    pub retry_delay: Duration,
}

impl LockConfig {
    /// Longest time an acquisition may wait.
    pub fn budget(&self) -> Duration {
        self.retry_delay.saturating_mul(self.max_attempts)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            retry_delay: Duration::from_millis(100),
        }
    }
}
