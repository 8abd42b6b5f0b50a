//! Error types for credential operations

/// Errors from login, refresh, and token storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("login rejected ({status}): {body}")]
    LoginRejected { status: u16, body: String },

    #[error("refresh token rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("token parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
