//! Typed errors surfaced to API callers

/// A failed API operation, reduced to the status/message shape callers
/// render.
///
/// `status()` is `None` when the failure happened before any HTTP status
/// existed (network failure, bad configuration).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The client could not be constructed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The exchange never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success status from the backend, body already classified.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The refresh exchange could not recover the session.
    #[error("session expired")]
    SessionExpired,
}

impl ApiError {
    /// HTTP status of the failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Config(_) | Self::Transport(_) => None,
            Self::Status { status, .. } => Some(*status),
            Self::SessionExpired => Some(401),
        }
    }

    /// Message for rendering.
    pub fn message(&self) -> String {
        match self {
            Self::Config(message) | Self::Transport(message) => message.clone(),
            Self::Status { message, .. } => message.clone(),
            Self::SessionExpired => "session expired".into(),
        }
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
