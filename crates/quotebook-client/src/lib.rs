//! Authenticated request client for the Quotebook backend
//!
//! Wraps every API call in the session lifecycle so callers never handle
//! tokens themselves:
//!
//! 1. The stored access token goes out as a bearer header
//! 2. A 401 joins the single-flight refresh cycle; concurrent callers
//!    share one refresh exchange
//! 3. A refreshed request is replayed exactly once
//! 4. Every failure settles into one [`ApiError`] shape
//!
//! ```no_run
//! use quotebook_client::ApiClient;
//!
//! # async fn run() -> quotebook_client::Result<()> {
//! let client = ApiClient::builder("https://api.quotebook.example").build()?;
//! client.login("ada", "hunter2").await?;
//! let quotes = client.get("/quotes?page=1").await?;
//! # let _ = quotes;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
mod metrics;
pub mod request;
pub mod session;

pub use classify::MAX_ERROR_BODY_CHARS;
pub use client::{ApiClient, ApiClientBuilder};
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use error::{ApiError, Result};
pub use request::ApiRequest;
pub use session::{NullSession, SessionEvents, SessionWatch};

// Storage types callers need to configure the client
pub use quotebook_auth::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
