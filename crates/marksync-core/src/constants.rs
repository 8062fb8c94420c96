//! Application-wide constants
//!
//! Channel names and user-facing messages shared by the submitter,
//! the relay and the change-feed listener.

/// Broadcast channel shared by every tab of one browser
pub const RELAY_CHANNEL: &str = "smart-bookmark-sync";

/// Name of the change-feed subscription
pub const FEED_CHANNEL: &str = "bookmarks-realtime";

/// Schema and table the change feed watches
pub const FEED_SCHEMA: &str = "public";
pub const FEED_TABLE: &str = "bookmarks";

// Error messages surfaced inline to the user
pub const MSG_FIELDS_REQUIRED: &str = "URL and title required";
pub const MSG_NOT_AUTHENTICATED: &str = "Not authenticated";
pub const MSG_ID_REQUIRED: &str = "Bookmark id required";
