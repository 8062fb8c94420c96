use std::collections::HashSet;

use crate::events::{ApplyOutcome, SyncEvent};
use crate::models::Bookmark;

/// Ordered, de-duplicated list of bookmarks shown to the user.
///
/// The initial population is sorted newest first. Live inserts are
/// prepended without re-sorting, so a late event can land ahead of newer
/// rows.
#[derive(Debug, Default, Clone)]
pub struct BookmarkStore {
    bookmarks: Vec<Bookmark>,
    ids: HashSet<String>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store. Duplicate ids keep their first (newest) occurrence.
    pub fn from_initial(mut bookmarks: Vec<Bookmark>) -> Self {
        bookmarks.sort_by(Bookmark::newest_first);
        let mut ids = HashSet::with_capacity(bookmarks.len());
        bookmarks.retain(|b| ids.insert(b.id.clone()));
        Self { bookmarks, ids }
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    pub fn snapshot(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn clear(&mut self) {
        self.bookmarks.clear();
        self.ids.clear();
    }

    // ===== Mutations =====

    /// Apply one event. Never fails: a missing target is a no-op.
    pub fn apply(&mut self, event: &SyncEvent) -> ApplyOutcome {
        match event {
            SyncEvent::Insert(bookmark) => {
                if !self.ids.insert(bookmark.id.clone()) {
                    return ApplyOutcome::Unchanged;
                }
                self.bookmarks.insert(0, bookmark.clone());
                ApplyOutcome::Inserted
            }
            SyncEvent::Update(bookmark) => {
                match self.bookmarks.iter_mut().find(|b| b.id == bookmark.id) {
                    Some(slot) => {
                        *slot = bookmark.clone();
                        ApplyOutcome::Updated
                    }
                    None => ApplyOutcome::Unchanged,
                }
            }
            SyncEvent::Delete(id) => {
                if !self.ids.remove(id) {
                    return ApplyOutcome::Unchanged;
                }
                self.bookmarks.retain(|b| &b.id != id);
                ApplyOutcome::Removed
            }
        }
    }
}
