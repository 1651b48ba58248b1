//! Session token ownership and storage
//!
//! A [`Session`] holds at most one opaque bearer token. The token is assumed
//! valid until the backend rejects it; nothing here tracks expiry. Storage is
//! injected through [`SessionStore`] so the same session can be backed by a
//! file for the CLI or by memory in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::redact_token;

/// Key under which the token is persisted. Stable across releases.
pub const TOKEN_KEY: &str = "access_token";

/// Durable single-slot storage for the session token.
pub trait SessionStore: Send + Sync {
    /// Read the stored token, if any.
    fn get(&self) -> Option<String>;

    /// Store `token`, replacing any prior value.
    fn set(&self, token: &str) -> Result<()>;

    /// Remove the stored token. Removing an absent token is not an error.
    fn clear(&self) -> Result<()>;
}

/// On-disk shape of the token file
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
}

/// Token persisted as a small JSON document on disk
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };

        match serde_json::from_str::<StoredSession>(&content) {
            Ok(stored) if !stored.access_token.is_empty() => Some(stored.access_token),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    fn set(&self, token: &str) -> Result<()> {
        let stored = StoredSession {
            access_token: token.to_string(),
        };
        let contents = serde_json::to_vec(&stored)?;
        self.write_atomically(&contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// In-process token slot
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, token: &str) -> Result<()> {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(())
    }
}

/// Handle to the one session of this client.
///
/// Cheap to clone; every clone shares the same store, so a token cleared by
/// the sync client is immediately gone for the controller too.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Session backed by a token file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileSessionStore::new(path)))
    }

    /// Session held only in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()))
    }

    pub fn get_token(&self) -> Option<String> {
        self.store.get()
    }

    /// Store a new token. Only emptiness is checked.
    pub fn set_token(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(Error::validation("token must not be empty"));
        }
        self.store.set(token)?;
        tracing::debug!(token = %redact_token(token), "Session token stored");
        Ok(())
    }

    pub fn clear_token(&self) -> Result<()> {
        self.store.clear()?;
        tracing::debug!("Session token cleared");
        Ok(())
    }

    /// True iff a token is present. Does not contact the backend.
    pub fn is_authenticated(&self) -> bool {
        self.get_token().is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
