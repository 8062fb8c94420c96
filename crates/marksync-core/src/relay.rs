//! Cross-context relay: the broadcast channel tabs of one browser use to
//! tell each other about confirmed mutations.
//!
//! Delivery is best-effort and at-most-once. A context never hears its own
//! messages, and anything published while nobody is listening is gone.
//! Each context opens one `RelayHandle` for its whole lifetime.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::SyncEvent;
use crate::models::Bookmark;

/// Wire payload exchanged between contexts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RelayMessage {
    Insert { record: Bookmark },
    Delete { id: String },
}

impl RelayMessage {
    /// Relay form of a confirmed local event. Updates are not relayed.
    pub fn from_event(event: &SyncEvent) -> Option<Self> {
        match event {
            SyncEvent::Insert(record) => Some(RelayMessage::Insert {
                record: record.clone(),
            }),
            SyncEvent::Delete(id) => Some(RelayMessage::Delete { id: id.clone() }),
            SyncEvent::Update(_) => None,
        }
    }

    pub fn into_event(self) -> SyncEvent {
        match self {
            RelayMessage::Insert { record } => SyncEvent::Insert(record),
            RelayMessage::Delete { id } => SyncEvent::Delete(id),
        }
    }
}

struct Listener {
    context_id: u64,
    tx: Sender<Value>,
}

#[derive(Default)]
struct HubState {
    channels: HashMap<String, Vec<Listener>>,
    next_context: u64,
}

/// Named broadcast channels shared by every context of one browser.
/// Cloning shares the hub; separate hubs model separate devices.
#[derive(Clone, Default)]
pub struct RelayHub {
    state: Arc<Mutex<HubState>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a long-lived handle on `channel` for one context.
    pub fn open(&self, channel: &str) -> RelayHandle {
        let context_id = {
            let mut state = self.state.lock();
            state.next_context += 1;
            state.next_context
        };
        RelayHandle {
            hub: self.clone(),
            channel: channel.to_string(),
            context_id,
            inbox: None,
            closed: false,
        }
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Deliver a raw payload to every listener on `channel` except `sender`.
    fn deliver(&self, channel: &str, sender: Option<u64>, payload: &Value) -> usize {
        let mut state = self.state.lock();
        let Some(listeners) = state.channels.get_mut(channel) else {
            return 0;
        };
        let mut delivered = 0;
        listeners.retain(|l| {
            if Some(l.context_id) == sender {
                return true;
            }
            let ok = l.tx.send(payload.clone()).is_ok();
            if ok {
                delivered += 1;
            }
            ok
        });
        delivered
    }

    /// Post an arbitrary payload, as a foreign context might.
    pub fn post_raw(&self, channel: &str, payload: Value) -> usize {
        self.deliver(channel, None, &payload)
    }

    fn register(&self, channel: &str, context_id: u64, tx: Sender<Value>) {
        self.state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(Listener { context_id, tx });
    }

    fn unregister(&self, channel: &str, context_id: u64) {
        let mut state = self.state.lock();
        if let Some(listeners) = state.channels.get_mut(channel) {
            listeners.retain(|l| l.context_id != context_id);
            if listeners.is_empty() {
                state.channels.remove(channel);
            }
        }
    }
}

/// Unsubscribe token returned by `RelayHandle::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySubscription(u64);

/// One context's end of a relay channel.
pub struct RelayHandle {
    hub: RelayHub,
    channel: String,
    context_id: u64,
    inbox: Option<Receiver<Value>>,
    closed: bool,
}

impl RelayHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Start receiving messages from other contexts.
    pub fn subscribe(&mut self) -> Option<RelaySubscription> {
        if self.closed {
            return None;
        }
        if self.inbox.is_none() {
            let (tx, rx) = mpsc::channel();
            self.hub.register(&self.channel, self.context_id, tx);
            self.inbox = Some(rx);
        }
        Some(RelaySubscription(self.context_id))
    }

    pub fn unsubscribe(&mut self, subscription: RelaySubscription) {
        if subscription.0 != self.context_id {
            return;
        }
        if self.inbox.take().is_some() {
            self.hub.unregister(&self.channel, self.context_id);
        }
    }

    /// Fire-and-forget. Returns how many contexts it reached.
    pub fn publish(&self, message: &RelayMessage) -> usize {
        if self.closed {
            debug!(channel = %self.channel, "publish on closed relay handle ignored");
            return 0;
        }
        let payload = match serde_json::to_value(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "relay message not serializable");
                return 0;
            }
        };
        self.hub.deliver(&self.channel, Some(self.context_id), &payload)
    }

    /// Take every message received so far. Unrecognized payloads are dropped.
    pub fn drain(&mut self) -> Vec<RelayMessage> {
        let Some(inbox) = self.inbox.as_ref() else {
            return Vec::new();
        };
        let mut messages = Vec::new();
        loop {
            match inbox.try_recv() {
                Ok(payload) => match serde_json::from_value::<RelayMessage>(payload) {
                    Ok(message) => messages.push(message),
                    Err(e) => {
                        warn!(channel = %self.channel, error = %e, "ignoring malformed relay payload")
                    }
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        messages
    }

    /// Stop listening and refuse further publishes. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.inbox.take().is_some() {
            self.hub.unregister(&self.channel, self.context_id);
        }
        debug!(channel = %self.channel, context = self.context_id, "relay handle closed");
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.close();
    }
}
