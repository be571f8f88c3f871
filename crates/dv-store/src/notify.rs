//! Change notifications emitted after a commit.
//!
//! Delivery is best-effort. The store calls the sink after the new content
//! is in place and the lock is released; a failing sink is logged and
//! otherwise ignored.

use chrono::{DateTime, Utc};
use dv_types::DocumentId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BoxError;

/// A committed change to one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique, time-ordered event identifier.
    pub id: Uuid,
    pub document: DocumentId,
    /// Logical event name supplied by the caller, e.g. `"grid-updated"`.
    pub event: String,
    pub committed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(document: DocumentId, event: impl Into<String>, committed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            document,
            event: event.into(),
            committed_at,
        }
    }
}

/// Receiver of change notifications.
pub trait ChangeSink: Send + Sync {
    fn notify(&self, event: &ChangeEvent) -> Result<(), BoxError>;
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn notify(&self, _event: &ChangeEvent) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Fans notifications out over a tokio broadcast channel.
///
/// Sending never blocks. With no subscribers the event is dropped, which is
/// not an error.
#[derive(Clone, Debug)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ChangeSink for BroadcastSink {
    fn notify(&self, event: &ChangeEvent) -> Result<(), BoxError> {
        // Err only means nobody is listening right now.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }
}

impl ChangeSink for RecordingSink {
    fn notify(&self, event: &ChangeEvent) -> Result<(), BoxError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
