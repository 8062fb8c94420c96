pub mod bookmark_store;

pub use bookmark_store::BookmarkStore;
