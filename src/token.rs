//! Token Store
//!
//! The connection manager reads the bearer token synchronously every time it
//! needs one: when a transport opens and when a reconnect decides whether to
//! keep the current session. Login flows write the token elsewhere; this
//! module only exposes the read side plus the small amount of write support
//! the CLI needs.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Synchronous accessor for the current bearer token
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` when signed out
    fn token(&self) -> Option<String>;
}

impl<F> TokenStore for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// In-memory token holder
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Token persisted in a single file
///
/// The file holds the raw token; surrounding whitespace is ignored and an
/// empty or missing file means no token.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user's local data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join("console-notify").join("token"))
            .unwrap_or_else(|| PathBuf::from("./console-notify-token"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a token, creating parent directories as needed
    pub fn store(&self, token: &str) -> Result<(), TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TokenError::Io {
                path: parent.to_path_buf(),
                error: e,
            })?;
        }

        std::fs::write(&self.path, token).map_err(|e| TokenError::Io {
            path: self.path.clone(),
            error: e,
        })?;

        tracing::debug!(path = ?self.path, "Token stored");
        Ok(())
    }

    /// Remove the stored token; a missing file is not an error
    pub fn clear(&self) -> Result<(), TokenError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenError::Io {
                path: self.path.clone(),
                error: e,
            }),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to read token file");
                None
            }
        }
    }
}

/// Errors writing the token file
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is empty")]
    Empty,

    #[error("Token file error at {path:?}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_set_clear() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.token(), None);

        store.set("tok123");
        assert_eq!(store.token().as_deref(), Some("tok123"));

        store.clear();
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_closure_store() {
        let store = || Some("from-closure".to_string());
        assert_eq!(TokenStore::token(&store).as_deref(), Some("from-closure"));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token"));

        assert_eq!(store.token(), None);

        store.store("  tok123\n").unwrap();
        assert_eq!(store.token().as_deref(), Some("tok123"));

        store.clear().unwrap();
        assert_eq!(store.token(), None);

        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_whitespace_only_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();

        let store = FileTokenStore::new(&path);
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_file_store_rejects_empty_token() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("token"));
        assert!(matches!(store.store("   "), Err(TokenError::Empty)));
    }
}
