use std::fmt;

use crate::models::Bookmark;

/// A single change to the bookmark list, whatever path it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Insert(Bookmark),
    /// Replaces the bookmark with the same id; ignored when absent
    Update(Bookmark),
    /// Removes the bookmark with this id; ignored when absent
    Delete(String),
}

impl SyncEvent {
    pub fn id(&self) -> &str {
        match self {
            SyncEvent::Insert(b) | SyncEvent::Update(b) => &b.id,
            SyncEvent::Delete(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Insert(_) => "insert",
            SyncEvent::Update(_) => "update",
            SyncEvent::Delete(_) => "delete",
        }
    }
}

/// Where an event came from. Only used for logging and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// Confirmed mutation from this tab
    Local,
    /// Another tab of the same browser
    Relay,
    /// Backing-store change feed
    Stream,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Local => "local",
            EventSource::Relay => "relay",
            EventSource::Stream => "stream",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What applying an event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Removed,
    /// Duplicate insert, or update/delete of an absent id
    Unchanged,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Inserted => "inserted",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Removed => "removed",
            ApplyOutcome::Unchanged => "unchanged",
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged)
    }
}
