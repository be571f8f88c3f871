use std::time::{Duration, Instant};

use serde_json::{Map, Value};

/// What a mutation decided to do with the document it was handed.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation<R> {
    /// Persist `document` and return `output` to the caller.
    Commit { document: Value, output: R },
    /// Leave storage untouched and return `output`.
    Keep { output: R },
}

impl<R> Mutation<R> {
    pub fn commit(document: Value, output: R) -> Self {
        Self::Commit { document, output }
    }

    pub fn keep(output: R) -> Self {
        Self::Keep { output }
    }

    /// Returns `true` if this mutation will be written.
    pub fn saves(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }
}

impl Mutation<()> {
    /// Persist `document` with no extra output.
    pub fn save(document: Value) -> Self {
        Self::commit(document, ())
    }

    /// Leave storage untouched with no extra output.
    pub fn skip() -> Self {
        Self::keep(())
    }
}

/// Which backup tiers receive the pre-update snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackupScope {
    /// Every configured tier.
    #[default]
    All,
    /// Only the named tiers.
    Only(Vec<String>),
}

/// Per-call settings for [`DocumentStore::update`](crate::DocumentStore::update).
#[derive(Clone, Debug)]
pub struct UpdateOptions {
    pub scope: BackupScope,
    /// Logical event name sent to the change sink on commit.
    pub event: String,
    /// Give up waiting for the lock at this instant.
    pub deadline: Option<Instant>,
    /// Value handed to the mutation when the document has no usable content.
    pub default: Value,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_tiers<I, S>(mut self, tiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = BackupScope::Only(tiers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            scope: BackupScope::All,
            event: "updated".into(),
            deadline: None,
            default: Value::Object(Map::new()),
        }
    }
}
