//! Durable storage for the session token pair
//!
//! The file-backed store keeps the JSON-serialized pair (or `null` when
//! logged out) on disk. All writes use atomic temp-file + rename to prevent
//! corruption on crash. A tokio Mutex serializes concurrent writers; reads
//! acquire the lock briefly to clone the in-memory state.
//!
//! The pair is always read and replaced as a unit, so no reader can ever
//! observe an access token alongside a refresh token from a different
//! exchange.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The session's bearer credentials.
///
/// Both tokens are opaque strings; nothing in this workspace decodes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token attached to API calls
    pub access: String,
    /// Long-lived token exchanged for the next pair
    pub refresh: String,
}

/// Storage the request client reads and overwrites.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Current pair, or `None` when logged out.
    fn current(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>>;

    /// Replace the stored pair as a unit.
    fn set(&self, pair: TokenPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Drop the stored pair, leaving the logged-out state.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// File-backed token store.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<Option<TokenPair>>,
}

impl FileTokenStore {
    /// Load the stored pair from the given file path.
    ///
    /// A missing or empty file is the logged-out state. The file is created
    /// eagerly so later saves never hit the cold-start path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let pair: Option<TokenPair> = if contents.trim().is_empty() {
                None
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| Error::Parse(format!("parsing token file: {e}")))?
            };
            info!(path = %path.display(), logged_in = pair.is_some(), "loaded token store");
            pair
        } else {
            info!(path = %path.display(), "token file not found, starting logged out");
            write_atomic(&path, &None).await?;
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }
}

impl TokenStore for FileTokenStore {
    fn current(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.clone()
        })
    }

    fn set(&self, pair: TokenPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = Some(pair);
            write_atomic(&self.path, &state).await?;
            debug!("stored token pair");
            Ok(())
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = None;
            write_atomic(&self.path, &state).await?;
            debug!("cleared token pair");
            Ok(())
        })
    }
}

/// In-memory token store for tests and hosts with ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn current(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.clone()
        })
    }

    fn set(&self, pair: TokenPair) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = Some(pair);
            Ok(())
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = None;
            Ok(())
        })
    }
}

/// Write the pair to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. This prevents corruption if the process crashes mid-write.
/// Sets file permissions to 0600 (owner read/write only) since the file
/// contains bearer tokens.
async fn write_atomic(path: &Path, pair: &Option<TokenPair>) -> Result<()> {
    let json = serde_json::to_string_pretty(pair)
        .map_err(|e| Error::Parse(format!("serializing token pair: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    // Set 0600 permissions (unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}
