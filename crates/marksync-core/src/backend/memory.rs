//! In-process backing store.
//!
//! `MemoryBackend` holds the rows and the open change-feed registrations.
//! Each `MemoryClient` is one signed-in session against it (one tab, or one
//! device), so several clients sharing a backend see each other's writes
//! through the feed.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use super::{BackendError, BackendFuture, BookmarkBackend, ChangeFeed, FeedToken};
use crate::change_feed::{ChangeType, FeedSignal, FeedStatus, RawChange, TableFilter};
use crate::constants::{FEED_SCHEMA, FEED_TABLE};
use crate::models::{Bookmark, NewBookmark};

#[derive(Debug, Clone)]
struct StoredRow {
    user_id: String,
    bookmark: Bookmark,
}

impl StoredRow {
    fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("id".into(), json!(self.bookmark.id));
        row.insert("user_id".into(), json!(self.user_id));
        row.insert("url".into(), json!(self.bookmark.url));
        row.insert("title".into(), json!(self.bookmark.title));
        row.insert("created_at".into(), json!(self.bookmark.created_at));
        row
    }
}

struct Registration {
    token: FeedToken,
    /// Principal the feed runs as; inserts and updates are only visible to the owner
    user_id: Option<String>,
    filter: TableFilter,
    signals: Sender<FeedSignal>,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<StoredRow>,
    registrations: Vec<Registration>,
    next_token: u64,
    fail_next_write: Option<BackendError>,
}

impl MemoryState {
    fn broadcast(&mut self, event_type: ChangeType, row: &StoredRow) {
        let change = match event_type {
            ChangeType::Insert | ChangeType::Update => RawChange {
                event_type,
                new: Some(row.to_row()),
                old: None,
            },
            // Deletes only carry the primary key
            ChangeType::Delete => {
                let mut old = Map::new();
                old.insert("id".into(), json!(row.bookmark.id));
                RawChange {
                    event_type,
                    new: None,
                    old: Some(old),
                }
            }
        };

        self.registrations.retain(|reg| {
            if reg.filter.schema != FEED_SCHEMA || reg.filter.table != FEED_TABLE {
                return true;
            }
            let visible = event_type == ChangeType::Delete
                || reg.user_id.as_deref() == Some(row.user_id.as_str());
            if !visible {
                return true;
            }
            reg.signals.send(FeedSignal::Change(change.clone())).is_ok()
        });
    }

    fn take_failure(&mut self) -> Result<(), BackendError> {
        match self.fail_next_write.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// The shared store. Cloning shares state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client signed in as `user_id`.
    pub fn client(&self, user_id: &str) -> MemoryClient {
        MemoryClient {
            backend: self.clone(),
            user_id: Some(user_id.to_string()),
            feed_failure: None,
        }
    }

    /// A client with no signed-in principal.
    pub fn anonymous_client(&self) -> MemoryClient {
        MemoryClient {
            backend: self.clone(),
            user_id: None,
            feed_failure: None,
        }
    }

    /// Make the next insert or delete fail with this message.
    pub fn fail_next_write(&self, message: &str) {
        self.state.lock().fail_next_write = Some(BackendError::backend(message));
    }

    pub fn row_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn open_feeds(&self) -> usize {
        self.state.lock().registrations.len()
    }

    /// Edit a row directly, as another writer would. Emits an UPDATE.
    pub fn update_row(
        &self,
        id: &str,
        url: Option<&str>,
        title: Option<&str>,
    ) -> Result<Bookmark, BackendError> {
        let mut state = self.state.lock();
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.bookmark.id == id)
            .ok_or_else(|| BackendError::backend(format!("no bookmark with id {}", id)))?;
        if let Some(url) = url {
            row.bookmark.url = url.to_string();
        }
        if let Some(title) = title {
            row.bookmark.title = title.to_string();
        }
        let row = row.clone();
        state.broadcast(ChangeType::Update, &row);
        Ok(row.bookmark)
    }

    fn insert_row(&self, new: NewBookmark) -> Result<Bookmark, BackendError> {
        let mut state = self.state.lock();
        state.take_failure()?;

        let row = StoredRow {
            user_id: new.user_id,
            bookmark: Bookmark {
                id: uuid::Uuid::new_v4().to_string(),
                url: new.url,
                title: new.title,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            },
        };
        state.rows.push(row.clone());
        state.broadcast(ChangeType::Insert, &row);
        Ok(row.bookmark)
    }

    fn delete_row(&self, user_id: &str, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.take_failure()?;

        let Some(pos) = state
            .rows
            .iter()
            .position(|r| r.bookmark.id == id && r.user_id == user_id)
        else {
            return Ok(());
        };
        let row = state.rows.remove(pos);
        state.broadcast(ChangeType::Delete, &row);
        Ok(())
    }

    fn rows_for(&self, user_id: &str) -> Vec<Bookmark> {
        let state = self.state.lock();
        let mut rows: Vec<Bookmark> = state
            .rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.bookmark.clone())
            .collect();
        rows.sort_by(Bookmark::newest_first);
        rows
    }
}

/// One signed-in client of a `MemoryBackend`.
#[derive(Clone)]
pub struct MemoryClient {
    backend: MemoryBackend,
    user_id: Option<String>,
    feed_failure: Option<String>,
}

impl MemoryClient {
    /// Feed subscriptions opened by this client report `ChannelError(message)`.
    pub fn with_feed_failure(mut self, message: &str) -> Self {
        self.feed_failure = Some(message.to_string());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

impl BookmarkBackend for MemoryClient {
    fn current_user(&self) -> BoxFuture<'_, Option<String>> {
        let user = self.user_id.clone();
        async move { user }.boxed()
    }

    fn insert(&self, row: NewBookmark) -> BackendFuture<'_, Bookmark> {
        let backend = self.backend.clone();
        async move { backend.insert_row(row) }.boxed()
    }

    fn delete<'a>(&'a self, user_id: &'a str, id: &'a str) -> BackendFuture<'a, ()> {
        async move { self.backend.delete_row(user_id, id) }.boxed()
    }

    fn list<'a>(&'a self, user_id: &'a str) -> BackendFuture<'a, Vec<Bookmark>> {
        async move { Ok(self.backend.rows_for(user_id)) }.boxed()
    }
}

impl ChangeFeed for MemoryClient {
    fn subscribe(
        &self,
        _channel: &str,
        filter: &TableFilter,
        signals: Sender<FeedSignal>,
    ) -> FeedToken {
        let mut state = self.backend.state.lock();
        state.next_token += 1;
        let token = FeedToken(state.next_token);

        if let Some(message) = &self.feed_failure {
            let _ = signals.send(FeedSignal::Status(FeedStatus::ChannelError(message.clone())));
            return token;
        }

        let _ = signals.send(FeedSignal::Status(FeedStatus::Subscribed));
        state.registrations.push(Registration {
            token,
            user_id: self.user_id.clone(),
            filter: filter.clone(),
            signals,
        });
        token
    }

    fn unsubscribe(&self, token: FeedToken) {
        self.backend
            .state
            .lock()
            .registrations
            .retain(|reg| reg.token != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn new_row(user: &str, url: &str, title: &str) -> NewBookmark {
        NewBookmark {
            user_id: user.to_string(),
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    fn filter() -> TableFilter {
        TableFilter::new(FEED_SCHEMA, FEED_TABLE)
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamp() {
        let backend = MemoryBackend::new();
        let client = backend.client("u1");

        let stored = client.insert(new_row("u1", "https://a", "A")).await.unwrap();
        assert!(!stored.id.is_empty());
        assert!(stored.created_at_time().is_some());
        assert_eq!(backend.row_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_owner() {
        let backend = MemoryBackend::new();
        let owner = backend.client("u1");
        let stored = owner.insert(new_row("u1", "https://a", "A")).await.unwrap();

        // Another principal's delete matches nothing
        backend.client("u2").delete("u2", &stored.id).await.unwrap();
        assert_eq!(backend.row_count(), 1);

        owner.delete("u1", &stored.id).await.unwrap();
        assert_eq!(backend.row_count(), 0);
        // Deleting again is fine
        owner.delete("u1", &stored.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let backend = MemoryBackend::new();
        let client = backend.client("u1");
        backend.fail_next_write("permission denied for table bookmarks");

        let err = client.insert(new_row("u1", "https://a", "A")).await.unwrap_err();
        assert_eq!(err.message, "permission denied for table bookmarks");
        assert_eq!(backend.row_count(), 0);
        assert!(client.insert(new_row("u1", "https://a", "A")).await.is_ok());
    }

    #[tokio::test]
    async fn test_feed_sees_owner_rows_and_all_deletes() {
        let backend = MemoryBackend::new();
        let (tx, rx) = mpsc::channel();
        let _token = backend.client("u1").subscribe("feed", &filter(), tx);
        assert_eq!(rx.try_recv().unwrap(), FeedSignal::Status(FeedStatus::Subscribed));

        let other = backend.client("u2");
        let theirs = other.insert(new_row("u2", "https://b", "B")).await.unwrap();
        assert!(rx.try_recv().is_err(), "other principal's insert must be hidden");

        other.delete("u2", &theirs.id).await.unwrap();
        match rx.try_recv().unwrap() {
            FeedSignal::Change(change) => assert_eq!(change.event_type, ChangeType::Delete),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let backend = MemoryBackend::new();
        let client = backend.client("u1");
        let first = client.insert(new_row("u1", "https://a", "A")).await.unwrap();
        let second = client.insert(new_row("u1", "https://b", "B")).await.unwrap();
        backend.client("u2").insert(new_row("u2", "https://c", "C")).await.unwrap();

        let listed = client.list("u1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|b| b.id.clone()).collect();
        // Equal timestamps are possible at microsecond resolution
        if second.created_at != first.created_at {
            assert_eq!(ids, vec![second.id, first.id]);
        } else {
            assert_eq!(ids.len(), 2);
        }
    }

    #[test]
    fn test_unsubscribe_and_failing_feed() {
        let backend = MemoryBackend::new();
        let (tx, rx) = mpsc::channel();
        let token = backend.client("u1").subscribe("feed", &filter(), tx);
        assert_eq!(backend.open_feeds(), 1);
        backend.client("u1").unsubscribe(token);
        assert_eq!(backend.open_feeds(), 0);
        drop(rx);

        let (tx, rx) = mpsc::channel();
        let failing = backend.client("u1").with_feed_failure("boom");
        failing.subscribe("feed", &filter(), tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            FeedSignal::Status(FeedStatus::ChannelError("boom".into()))
        );
        assert_eq!(backend.open_feeds(), 0);
    }
}
