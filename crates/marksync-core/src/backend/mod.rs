//! Contracts for the backing store the sync core talks to.
//!
//! The store itself lives elsewhere; `memory` provides an in-process
//! implementation for tests and local simulation.

pub mod memory;

use std::sync::mpsc::Sender;

use futures::future::BoxFuture;

use crate::change_feed::{FeedSignal, TableFilter};
use crate::error::SyncError;
use crate::models::{Bookmark, NewBookmark};

pub use memory::{MemoryBackend, MemoryClient};

pub type BackendFuture<'a, T> = BoxFuture<'a, Result<T, BackendError>>;

/// Class of a backend failure. The message is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Validation,
    Auth,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Backend, message)
    }
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::Validation => SyncError::Validation {
                message: err.message,
            },
            BackendErrorKind::Auth => SyncError::Auth {
                message: err.message,
            },
            BackendErrorKind::Backend => SyncError::Backend {
                message: err.message,
            },
        }
    }
}

/// Writes and reads against the bookmarks table, on behalf of whichever
/// principal the client is signed in as.
pub trait BookmarkBackend {
    /// The signed-in principal's id, if any.
    fn current_user(&self) -> BoxFuture<'_, Option<String>>;

    /// Persist a row and return it as stored (server-assigned id and timestamp).
    fn insert(&self, row: NewBookmark) -> BackendFuture<'_, Bookmark>;

    /// Delete the principal's row with this id. Matching nothing is not an error.
    fn delete<'a>(&'a self, user_id: &'a str, id: &'a str) -> BackendFuture<'a, ()>;

    /// All of the principal's rows, newest first.
    fn list<'a>(&'a self, user_id: &'a str) -> BackendFuture<'a, Vec<Bookmark>>;
}

/// Opaque handle for a change-feed registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedToken(pub u64);

/// Row-level change notifications from the backing store.
///
/// The transport reports subscription status and row changes through
/// `signals`. Sends to a dropped receiver are ignored by the transport.
pub trait ChangeFeed {
    fn subscribe(&self, channel: &str, filter: &TableFilter, signals: Sender<FeedSignal>)
        -> FeedToken;

    fn unsubscribe(&self, token: FeedToken);
}
