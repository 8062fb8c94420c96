use crate::constants::{MSG_FIELDS_REQUIRED, MSG_NOT_AUTHENTICATED};

/// Failures produced by the sync core.
///
/// `Validation`, `Auth` and `Backend` are shown to the user inline.
/// `Channel` is only logged: the affected sync path goes quiet and the
/// view keeps working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    Auth { message: String },
    /// Backend message, kept verbatim
    #[error("{message}")]
    Backend { message: String },
    #[error("{channel} subscription failed: {message}")]
    Channel { channel: String, message: String },
}

impl SyncError {
    pub fn missing_fields() -> Self {
        SyncError::Validation {
            message: MSG_FIELDS_REQUIRED.to_string(),
        }
    }

    pub fn not_authenticated() -> Self {
        SyncError::Auth {
            message: MSG_NOT_AUTHENTICATED.to_string(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        SyncError::Backend {
            message: message.into(),
        }
    }

    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs in the inline error slot of the view.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, SyncError::Channel { .. })
    }
}
