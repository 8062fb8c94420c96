//! A sync session: one active view of the bookmark list.
//!
//! The session owns the store and both subscriptions, and `apply` is the
//! only way the store changes. Confirmed local mutations, relay messages
//! and change-feed rows all go through it, and duplicate inserts are
//! absorbed there. There is no ordering metadata between sources: for
//! updates racing on the same id, whichever is applied last wins.
//!
//! Everything runs on the owner's thread. Relay and feed deliveries queue
//! up until the owner calls `process_pending`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{BookmarkBackend, ChangeFeed};
use crate::change_feed::{FeedBatch, FeedListener, FeedState};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{ApplyOutcome, EventSource, SyncEvent};
use crate::models::Bookmark;
use crate::relay::{RelayHandle, RelayHub, RelayMessage};
use crate::stats::SharedSyncStats;
use crate::store::BookmarkStore;
use crate::submitter::MutationSubmitter;

pub struct SyncSession {
    config: SyncConfig,
    store: BookmarkStore,
    submitter: MutationSubmitter,
    relay: Option<RelayHandle>,
    feed: Option<FeedListener>,
    /// Message for the most recent failed mutation; empty when none
    last_error: String,
    /// Channel failures, logged but never shown to the user
    diagnostics: Vec<SyncError>,
    stats: SharedSyncStats,
    active: bool,
}

impl SyncSession {
    /// Activate a session for a client that is both writer and feed source,
    /// loading the principal's bookmarks as the initial population.
    ///
    /// Subscriptions are opened before the load so nothing written in
    /// between is missed; anything that overlaps the load is deduplicated.
    pub async fn activate<C>(config: SyncConfig, client: Arc<C>, hub: &RelayHub) -> Self
    where
        C: BookmarkBackend + ChangeFeed + 'static,
    {
        let backend: Arc<dyn BookmarkBackend> = client.clone();
        let feed: Arc<dyn ChangeFeed> = client;
        let mut session = Self::with_initial(config, backend.clone(), feed, hub, Vec::new());

        let loaded = match session.submitter.require_user().await {
            Ok(user_id) => backend.list(&user_id).await.map_err(SyncError::from),
            Err(e) => Err(e),
        };
        match loaded {
            Ok(bookmarks) => {
                info!(count = bookmarks.len(), "initial bookmarks loaded");
                session.store = BookmarkStore::from_initial(bookmarks);
            }
            Err(e) => {
                warn!(error = %e, "initial load failed; starting empty");
                session.last_error = e.to_string();
            }
        }
        session
    }

    /// Activate with a known initial population.
    pub fn with_initial(
        config: SyncConfig,
        backend: Arc<dyn BookmarkBackend>,
        feed: Arc<dyn ChangeFeed>,
        hub: &RelayHub,
        initial: Vec<Bookmark>,
    ) -> Self {
        let stats = SharedSyncStats::new();
        let mut diagnostics = Vec::new();

        let mut relay = hub.open(&config.relay_channel);
        if relay.subscribe().is_none() {
            let err = SyncError::channel(&config.relay_channel, "relay handle closed");
            warn!(error = %err, "relay unavailable; other tabs will not be heard");
            stats.record_channel_error();
            diagnostics.push(err);
        }

        let feed = FeedListener::subscribe(feed, &config.feed_channel, &config.table_filter());

        info!(
            relay = %config.relay_channel,
            feed = %config.feed_channel,
            "sync session activated"
        );

        Self {
            store: BookmarkStore::from_initial(initial),
            submitter: MutationSubmitter::new(backend),
            relay: Some(relay),
            feed: Some(feed),
            last_error: String::new(),
            diagnostics,
            stats,
            active: true,
            config,
        }
    }

    // ===== Reconciler =====

    /// Apply one event to the store. After deactivation this is a no-op.
    pub fn apply(&mut self, source: EventSource, event: &SyncEvent) -> ApplyOutcome {
        if !self.active {
            debug!(%source, kind = event.kind(), id = event.id(), "event after teardown ignored");
            return ApplyOutcome::Unchanged;
        }
        let outcome = self.store.apply(event);
        self.stats.record(source, outcome);
        debug!(
            %source,
            kind = event.kind(),
            id = event.id(),
            outcome = outcome.as_str(),
            "applied sync event"
        );
        outcome
    }

    /// Run one event-loop turn: apply everything the relay and the change
    /// feed have delivered. Returns the number of events applied.
    pub fn process_pending(&mut self) -> usize {
        if !self.active {
            return 0;
        }

        let relayed: Vec<SyncEvent> = match self.relay.as_mut() {
            Some(relay) => relay.drain().into_iter().map(RelayMessage::into_event).collect(),
            None => Vec::new(),
        };
        let batch = match self.feed.as_mut() {
            Some(feed) => feed.poll(),
            None => FeedBatch::default(),
        };

        if let Some(message) = batch.failure {
            self.stats.record_channel_error();
            self.diagnostics
                .push(SyncError::channel(&self.config.feed_channel, message));
        }

        let mut applied = 0;
        for event in &relayed {
            self.apply(EventSource::Relay, event);
            applied += 1;
        }
        for event in &batch.events {
            self.apply(EventSource::Stream, event);
            applied += 1;
        }
        applied
    }

    // ===== User mutations =====

    /// Add a bookmark. Only a confirmed row touches the store; it is then
    /// announced to the other tabs.
    pub async fn add_bookmark(&mut self, url: &str, title: &str) -> Result<Bookmark, SyncError> {
        self.last_error.clear();
        match self.submitter.submit_add(url, title).await {
            Ok(stored) => {
                self.confirm(SyncEvent::Insert(stored.clone()));
                Ok(stored)
            }
            Err(e) => {
                self.last_error = e.to_string();
                Err(e)
            }
        }
    }

    pub async fn remove_bookmark(&mut self, id: &str) -> Result<(), SyncError> {
        self.last_error.clear();
        match self.submitter.submit_remove(id).await {
            Ok(()) => {
                self.confirm(SyncEvent::Delete(id.to_string()));
                Ok(())
            }
            Err(e) => {
                self.last_error = e.to_string();
                Err(e)
            }
        }
    }

    fn confirm(&mut self, event: SyncEvent) {
        self.apply(EventSource::Local, &event);
        if !self.active {
            return;
        }
        if let (Some(relay), Some(message)) = (self.relay.as_ref(), RelayMessage::from_event(&event)) {
            let reached = relay.publish(&message);
            debug!(kind = event.kind(), id = event.id(), reached, "relayed to other tabs");
        }
    }

    // ===== Lifecycle =====

    /// Release both subscriptions. Later deliveries are dropped.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(relay) = self.relay.as_mut() {
            relay.close();
        }
        if let Some(feed) = self.feed.as_mut() {
            feed.close();
        }
        info!(relay = %self.config.relay_channel, "sync session deactivated");
    }

    // ===== Getters =====

    pub fn snapshot(&self) -> &[Bookmark] {
        self.store.snapshot()
    }

    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn diagnostics(&self) -> &[SyncError] {
        &self.diagnostics
    }

    pub fn stats(&self) -> SharedSyncStats {
        self.stats.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn feed_state(&self) -> Option<&FeedState> {
        self.feed.as_ref().map(|f| f.state())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}
