//! Session credential handling for the Quotebook backend
//!
//! Provides the login/refresh wire calls and durable storage for the
//! access/refresh token pair. This crate stands alone with no dependency
//! on the request client.
//!
//! Credential flow:
//! 1. Host calls `token::login()` with the user's credentials
//! 2. The returned pair is stored via `TokenStore::set()`
//! 3. Requests read the access token via `TokenStore::current()`
//! 4. On expiry the request client calls `token::refresh()`
//! 5. The refreshed pair overwrites the stored one as a unit
//! 6. A failed refresh clears the store via `TokenStore::clear()`

pub mod endpoints;
pub mod error;
pub mod store;
pub mod token;

pub use endpoints::{LOGIN_PATH, REFRESH_PATH, join_url};
pub use error::{Error, Result};
pub use store::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
pub use token::{TokenResponse, login, refresh};
