//! In-process editing lock registry.
//!
//! [`InMemoryEditLocks`] keeps records in a `HashMap` behind a `RwLock`. It
//! suits a single server process and tests; records vanish with the process.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dv_types::DocumentId;
use tracing::debug;

use crate::error::{EditLockError, Result};
use crate::traits::EditLockRegistry;
use crate::types::{validate_holder, EditLockConfig, LockInfo};

/// An in-memory implementation of [`EditLockRegistry`].
#[derive(Debug)]
pub struct InMemoryEditLocks {
    ttl: Duration,
    records: RwLock<HashMap<DocumentId, LockInfo>>,
}

impl InMemoryEditLocks {
    pub fn new(config: &EditLockConfig) -> Self {
        Self {
            ttl: config.ttl,
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEditLocks {
    fn default() -> Self {
        Self::new(&EditLockConfig::default())
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> EditLockError {
    EditLockError::Poisoned(e.to_string())
}

impl EditLockRegistry for InMemoryEditLocks {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn acquire(&self, document: &DocumentId, holder: &str, now: DateTime<Utc>) -> Result<LockInfo> {
        validate_holder(holder)?;
        let info = LockInfo::new(document.clone(), holder, now, self.ttl);
        let mut records = self.records.write().map_err(poisoned)?;
        if let Some(previous) = records.insert(document.clone(), info.clone()) {
            if previous.is_live(now) && !previous.is_held_by(holder) {
                debug!(document = %document, from = %previous.holder, to = holder, "editing lock taken over");
            }
        }
        Ok(info)
    }

    fn inspect(&self, document: &DocumentId, now: DateTime<Utc>) -> Result<Option<LockInfo>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(document).filter(|info| info.is_live(now)).cloned())
    }

    fn release(&self, document: &DocumentId, holder: &str) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.get(document) {
            Some(info) if info.is_held_by(holder) => {
                records.remove(document);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn active(&self, now: DateTime<Utc>) -> Result<Vec<LockInfo>> {
        let mut records = self.records.write().map_err(poisoned)?;
        // Expired records are dead weight; drop them while we hold the lock.
        records.retain(|_, info| info.is_live(now));
        let mut live: Vec<LockInfo> = records.values().cloned().collect();
        live.sort_by(|a, b| a.document.cmp(&b.document));
        Ok(live)
    }
}
