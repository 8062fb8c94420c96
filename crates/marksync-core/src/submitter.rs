//! Mutation submitter: user-initiated adds and removes against the backing
//! store. It never touches the bookmark list; the caller feeds the result
//! into the session.

use std::sync::Arc;

use tracing::debug;

use crate::backend::BookmarkBackend;
use crate::constants::MSG_ID_REQUIRED;
use crate::error::SyncError;
use crate::models::{Bookmark, NewBookmark};

pub struct MutationSubmitter {
    backend: Arc<dyn BookmarkBackend>,
}

impl MutationSubmitter {
    pub fn new(backend: Arc<dyn BookmarkBackend>) -> Self {
        Self { backend }
    }

    /// Persist a new bookmark and return the stored row.
    ///
    /// Blank `url` or `title` fails before any backend call. Backend
    /// rejections come back with their message unchanged; nothing is retried.
    pub async fn submit_add(&self, url: &str, title: &str) -> Result<Bookmark, SyncError> {
        let url = url.trim();
        let title = title.trim();
        if url.is_empty() || title.is_empty() {
            return Err(SyncError::missing_fields());
        }

        let user_id = self.require_user().await?;
        let stored = self
            .backend
            .insert(NewBookmark {
                user_id,
                url: url.to_string(),
                title: title.to_string(),
            })
            .await?;
        debug!(id = %stored.id, "bookmark persisted");
        Ok(stored)
    }

    /// Delete one of the principal's bookmarks.
    pub async fn submit_remove(&self, id: &str) -> Result<(), SyncError> {
        if id.trim().is_empty() {
            return Err(SyncError::Validation {
                message: MSG_ID_REQUIRED.to_string(),
            });
        }

        let user_id = self.require_user().await?;
        self.backend.delete(&user_id, id).await?;
        debug!(id, "bookmark deleted");
        Ok(())
    }

    /// Signed-in principal, or an auth error.
    pub async fn require_user(&self) -> Result<String, SyncError> {
        self.backend
            .current_user()
            .await
            .ok_or_else(SyncError::not_authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn make_submitter(backend: &MemoryBackend, user: Option<&str>) -> MutationSubmitter {
        let client = match user {
            Some(user) => backend.client(user),
            None => backend.anonymous_client(),
        };
        MutationSubmitter::new(Arc::new(client))
    }

    #[tokio::test]
    async fn test_add_returns_canonical_row() {
        let backend = MemoryBackend::new();
        let submitter = make_submitter(&backend, Some("u1"));

        let stored = submitter.submit_add("  https://a  ", " A ").await.unwrap();
        assert_eq!(stored.url, "https://a");
        assert_eq!(stored.title, "A");
        assert!(!stored.id.is_empty());
        assert!(!stored.created_at.is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_never_reaches_backend() {
        let backend = MemoryBackend::new();
        // Even an anonymous client fails validation first
        let submitter = make_submitter(&backend, None);

        let err = submitter.submit_add("   ", "A").await.unwrap_err();
        assert_eq!(err, SyncError::missing_fields());
        let err = submitter.submit_add("https://a", "").await.unwrap_err();
        assert_eq!(err, SyncError::missing_fields());
        assert_eq!(backend.row_count(), 0);
    }

    #[tokio::test]
    async fn test_requires_principal() {
        let backend = MemoryBackend::new();
        let submitter = make_submitter(&backend, None);

        assert_eq!(
            submitter.submit_add("https://a", "A").await.unwrap_err(),
            SyncError::not_authenticated()
        );
        assert_eq!(
            submitter.submit_remove("1").await.unwrap_err(),
            SyncError::not_authenticated()
        );
    }

    #[tokio::test]
    async fn test_backend_rejection_is_verbatim() {
        let backend = MemoryBackend::new();
        let submitter = make_submitter(&backend, Some("u1"));
        backend.fail_next_write("new row violates row-level security policy");

        let err = submitter.submit_add("https://a", "A").await.unwrap_err();
        assert_eq!(
            err,
            SyncError::backend("new row violates row-level security policy")
        );
        assert_eq!(backend.row_count(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let backend = MemoryBackend::new();
        let submitter = make_submitter(&backend, Some("u1"));
        let stored = submitter.submit_add("https://a", "A").await.unwrap();

        submitter.submit_remove(&stored.id).await.unwrap();
        assert_eq!(backend.row_count(), 0);
        assert!(matches!(
            submitter.submit_remove(" ").await,
            Err(SyncError::Validation { .. })
        ));
    }
}
