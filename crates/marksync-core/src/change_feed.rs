//! Change-feed listener: turns backing-store row notifications into
//! `SyncEvent`s.
//!
//! Rows arrive as untyped field maps and are normalized here, so nothing
//! past this module sees the raw shape. A failed subscription is logged and
//! leaves the listener quiet; it never takes the session down.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backend::{ChangeFeed, FeedToken};
use crate::events::SyncEvent;
use crate::models::Bookmark;

/// Which table a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableFilter {
    pub schema: String,
    pub table: String,
}

impl TableFilter {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// A row change as the feed delivers it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Map<String, Value>>,
}

impl RawChange {
    /// Normalize into a `SyncEvent`.
    ///
    /// Inserts and updates read `new`, deletes read `old`. Returns `None`
    /// when the needed row is absent or carries no id.
    pub fn normalize(&self) -> Option<SyncEvent> {
        let event = match self.event_type {
            ChangeType::Insert => SyncEvent::Insert(Bookmark::from_row(self.new.as_ref()?)),
            ChangeType::Update => SyncEvent::Update(Bookmark::from_row(self.new.as_ref()?)),
            ChangeType::Delete => SyncEvent::Delete(Bookmark::from_row(self.old.as_ref()?).id),
        };
        if event.id().is_empty() {
            return None;
        }
        Some(event)
    }
}

/// Status reported by the feed transport for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Status(FeedStatus),
    Change(RawChange),
}

/// Subscription lifecycle: `Connecting -> Subscribed -> (Errored | Closed)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Subscribed,
    Errored(String),
    Closed,
}

impl FeedState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Errored(_) | FeedState::Closed)
    }
}

/// What one `poll` produced.
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub events: Vec<SyncEvent>,
    /// Set when the subscription failed during this poll
    pub failure: Option<String>,
}

/// One live subscription to the change feed, released on `close` or drop.
pub struct FeedListener {
    feed: Arc<dyn ChangeFeed>,
    channel: String,
    token: Option<FeedToken>,
    signals: Receiver<FeedSignal>,
    state: FeedState,
}

impl FeedListener {
    pub fn subscribe(feed: Arc<dyn ChangeFeed>, channel: &str, filter: &TableFilter) -> Self {
        let (tx, rx) = mpsc::channel();
        let token = feed.subscribe(channel, filter, tx);
        debug!(channel, table = %filter.table, "change feed connecting");
        Self {
            feed,
            channel: channel.to_string(),
            token: Some(token),
            signals: rx,
            state: FeedState::Connecting,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Drain everything the transport has delivered so far.
    pub fn poll(&mut self) -> FeedBatch {
        let mut batch = FeedBatch::default();

        loop {
            if self.state.is_terminal() {
                break;
            }
            let signal = match self.signals.try_recv() {
                Ok(signal) => signal,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fail("feed transport went away", &mut batch);
                    break;
                }
            };

            match signal {
                FeedSignal::Status(FeedStatus::Subscribed) => {
                    info!(channel = %self.channel, "change feed subscribed");
                    self.state = FeedState::Subscribed;
                }
                FeedSignal::Status(FeedStatus::ChannelError(message)) => {
                    self.fail(&message, &mut batch);
                }
                FeedSignal::Status(FeedStatus::TimedOut) => {
                    self.fail("subscription timed out", &mut batch);
                }
                FeedSignal::Status(FeedStatus::Closed) => {
                    info!(channel = %self.channel, "change feed closed by transport");
                    self.state = FeedState::Closed;
                }
                FeedSignal::Change(change) => match change.normalize() {
                    Some(event) => batch.events.push(event),
                    None => warn!(
                        channel = %self.channel,
                        event_type = ?change.event_type,
                        "dropping change without a usable row id"
                    ),
                },
            }
        }

        batch
    }

    fn fail(&mut self, message: &str, batch: &mut FeedBatch) {
        warn!(
            channel = %self.channel,
            error = message,
            "change feed unavailable; updates from other sessions will not arrive"
        );
        self.state = FeedState::Errored(message.to_string());
        batch.failure = Some(message.to_string());
        self.release();
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            self.feed.unsubscribe(token);
        }
    }

    /// Release the subscription. Safe to call more than once.
    pub fn close(&mut self) {
        self.release();
        if !self.state.is_terminal() {
            debug!(channel = %self.channel, "change feed released");
            self.state = FeedState::Closed;
        }
    }
}

impl Drop for FeedListener {
    fn drop(&mut self) {
        self.release();
    }
}
