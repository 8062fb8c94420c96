pub mod backend;
pub mod change_feed;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod relay;
pub mod session;
pub mod stats;
pub mod store;
pub mod submitter;

// Re-export the types most callers need at crate root
pub use config::SyncConfig;
pub use error::SyncError;
pub use events::{ApplyOutcome, EventSource, SyncEvent};
pub use models::{Bookmark, NewBookmark};
pub use session::SyncSession;
