//! Access token model and token persistence.
//!
//! The store contract is deliberately thin: it persists and retrieves the
//! access token (with its absolute expiry instant) and the long-lived
//! refresh token, nothing more.  Expiry interpretation is the client's
//! responsibility, and the client is the sole writer of store entries.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SisError, SisResult};

/// A short-lived access token with its absolute expiry instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The raw bearer token string.
    pub token: String,
    /// Instant after which the token must not be used for a request.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is expired at the given instant.
    ///
    /// A token exactly at its expiry instant counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Persistence contract for access and refresh tokens.
///
/// Saving `None` clears the persisted state.  No validation beyond presence
/// is performed here.
pub trait TokenStore: Send + Sync {
    /// Load the persisted access token, if any.
    fn load(&self) -> SisResult<Option<AccessToken>>;

    /// Persist the access token, or clear it when `None`.
    fn save(&self, token: Option<&AccessToken>) -> SisResult<()>;

    /// Load the persisted refresh token, if any.
    fn load_refresh(&self) -> SisResult<Option<String>>;

    /// Persist the refresh token, or clear it when `None`.
    fn save_refresh(&self, token: Option<&str>) -> SisResult<()>;
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<StoredTokens>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredTokens {
    access_token: Option<AccessToken>,
    refresh_token: Option<String>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SisResult<std::sync::MutexGuard<'_, StoredTokens>> {
        self.inner
            .lock()
            .map_err(|_| SisError::TokenStore("token store lock poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> SisResult<Option<AccessToken>> {
        Ok(self.lock()?.access_token.clone())
    }

    fn save(&self, token: Option<&AccessToken>) -> SisResult<()> {
        self.lock()?.access_token = token.cloned();
        Ok(())
    }

    fn load_refresh(&self) -> SisResult<Option<String>> {
        Ok(self.lock()?.refresh_token.clone())
    }

    fn save_refresh(&self, token: Option<&str>) -> SisResult<()> {
        self.lock()?.refresh_token = token.map(str::to_owned);
        Ok(())
    }
}

/// Token store persisted as one JSON file.
///
/// Best-effort and unlocked: concurrent overlapping runs are prevented by
/// the external scheduler, not by this store.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store backed by the given file path.  The file is created
    /// on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> SisResult<StoredTokens> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| SisError::TokenStore(format!("unreadable token file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredTokens::default()),
            Err(e) => Err(SisError::TokenStore(format!(
                "failed to read token file: {e}"
            ))),
        }
    }

    fn write(&self, tokens: &StoredTokens) -> SisResult<()> {
        let contents = serde_json::to_string(tokens)
            .map_err(|e| SisError::TokenStore(format!("failed to encode tokens: {e}")))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| SisError::TokenStore(format!("failed to write token file: {e}")))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> SisResult<Option<AccessToken>> {
        Ok(self.read()?.access_token)
    }

    fn save(&self, token: Option<&AccessToken>) -> SisResult<()> {
        let mut tokens = self.read()?;
        tokens.access_token = token.cloned();
        self.write(&tokens)
    }

    fn load_refresh(&self) -> SisResult<Option<String>> {
        Ok(self.read()?.refresh_token)
    }

    fn save_refresh(&self, token: Option<&str>) -> SisResult<()> {
        let mut tokens = self.read()?;
        tokens.refresh_token = token.map(str::to_owned);
        self.write(&tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_in(secs: i64) -> AccessToken {
        AccessToken {
            token: "tok".into(),
            expires_at: Utc::now() + Duration::seconds(secs),
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let token = AccessToken {
            token: "tok".into(),
            expires_at: now,
        };
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - Duration::seconds(1)));
        assert!(token.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.load().unwrap().is_none());

        let token = token_expiring_in(3600);
        store.save(Some(&token)).unwrap();
        store.save_refresh(Some("refresh")).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));
        assert_eq!(store.load_refresh().unwrap().as_deref(), Some("refresh"));

        store.save(None).unwrap();
        store.save_refresh(None).unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(store.load_refresh().unwrap().is_none());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let token = token_expiring_in(600);
        {
            let store = FileTokenStore::new(&path);
            store.save(Some(&token)).unwrap();
            store.save_refresh(Some("refresh")).unwrap();
        }

        let store = FileTokenStore::new(&path);
        assert_eq!(store.load().unwrap(), Some(token));
        assert_eq!(store.load_refresh().unwrap().as_deref(), Some("refresh"));
    }

    #[test]
    fn file_store_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
        assert!(store.load_refresh().unwrap().is_none());
    }
}
