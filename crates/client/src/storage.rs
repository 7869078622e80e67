//! Token persistence
//!
//! [`TokenStore`] keeps the user id, access token and refresh token in a
//! [`StorageBackend`]. Backend failures never reach callers: reads degrade to
//! `None` and writes become no-ops, with the failure logged.

use crate::config::AuthConfig;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, error};

/// Storage backend failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key/value persistence surface used by the token store
pub trait StorageBackend: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Write several values. Backends that can should apply them as one change.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Delete several values. Backends that can should apply them as one change.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Process-local storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in pairs {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// JSON object file on disk, rewritten through a temporary file on every change
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Use `path` as the backing file; it is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        if let Err(e) = std::fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        // Holds bearer credentials: owner only
        #[cfg(unix)]
        std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

        let mut file = options.open(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(entries)?)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_many(&[key])
    }

    fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StorageError> {
        let _guard = self.lock();
        let mut entries = self.read_all()?;
        for (key, value) in pairs {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        self.write_all(&entries)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock();
        let mut entries = self.read_all()?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() != before {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Complete persisted session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
}

/// Passive persistence of the session credentials.
///
/// Cheap to clone; clones share the same backend. A store without a backend
/// (see [`TokenStore::detached`]) reads `None` and ignores writes.
///
/// Every change to the tokens advances an epoch shared by all clones. A token
/// refresh records the epoch when it starts and only writes its outcome back
/// if no login, logout or other token change happened meanwhile (see
/// [`rotate_tokens`](Self::rotate_tokens)).
#[derive(Clone, Default)]
pub struct TokenStore {
    backend: Option<Arc<dyn StorageBackend>>,
    epoch: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("attached", &self.backend.is_some())
            .finish()
    }
}

impl TokenStore {
    const AUTH_KEYS: [&'static str; 3] = [
        AuthConfig::USER_ID_KEY,
        AuthConfig::ACCESS_TOKEN_KEY,
        AuthConfig::REFRESH_TOKEN_KEY,
    ];

    /// Store backed by `backend`
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
            epoch: Arc::default(),
        }
    }

    /// In-memory store
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Store with no backend, for contexts without persistent storage
    pub fn detached() -> Self {
        Self::default()
    }

    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token epoch
    pub fn epoch(&self) -> u64 {
        *self.lock_epoch()
    }

    /// Epoch and refresh token, read together
    pub fn refresh_snapshot(&self) -> (u64, Option<String>) {
        let epoch = self.lock_epoch();
        (*epoch, self.refresh_token())
    }

    fn read(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "Error reading from token storage");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.set(key, value) {
            error!(key, error = %e, "Error writing to token storage");
        }
    }

    fn delete(&self, key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.remove(key) {
            error!(key, error = %e, "Error removing from token storage");
        }
    }

    fn write_many(&self, entries: &[(&str, &str)]) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.set_many(entries) {
            error!(keys = entries.len(), error = %e, "Error writing to token storage");
        }
    }

    fn delete_many(&self, keys: &[&str]) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.remove_many(keys) {
            error!(keys = keys.len(), error = %e, "Error removing from token storage");
        }
    }

    /// Run a token change under the epoch lock and advance the epoch
    fn change_tokens(&self, change: impl FnOnce()) {
        let mut epoch = self.lock_epoch();
        *epoch += 1;
        change();
    }

    pub fn user_id(&self) -> Option<String> {
        self.read(AuthConfig::USER_ID_KEY)
    }

    pub fn set_user_id(&self, user_id: &str) {
        self.write(AuthConfig::USER_ID_KEY, user_id);
    }

    pub fn remove_user_id(&self) {
        self.delete(AuthConfig::USER_ID_KEY);
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(AuthConfig::ACCESS_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) {
        self.change_tokens(|| self.write(AuthConfig::ACCESS_TOKEN_KEY, token));
    }

    pub fn remove_access_token(&self) {
        self.change_tokens(|| self.delete(AuthConfig::ACCESS_TOKEN_KEY));
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(AuthConfig::REFRESH_TOKEN_KEY)
    }

    pub fn set_refresh_token(&self, token: &str) {
        self.change_tokens(|| self.write(AuthConfig::REFRESH_TOKEN_KEY, token));
    }

    pub fn remove_refresh_token(&self) {
        self.change_tokens(|| self.delete(AuthConfig::REFRESH_TOKEN_KEY));
    }

    /// Persist a token pair in one write
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        self.change_tokens(|| self.write_token_pair(access_token, refresh_token));
    }

    fn write_token_pair(&self, access_token: &str, refresh_token: &str) {
        self.write_many(&[
            (AuthConfig::ACCESS_TOKEN_KEY, access_token),
            (AuthConfig::REFRESH_TOKEN_KEY, refresh_token),
        ]);
    }

    /// Persist a rotated pair only if the tokens are unchanged since `epoch`.
    ///
    /// Returns false, writing nothing, when a login, logout or other token
    /// change happened after the refresh started.
    pub fn rotate_tokens(&self, epoch: u64, access_token: &str, refresh_token: &str) -> bool {
        let mut current = self.lock_epoch();
        if *current != epoch {
            return false;
        }
        *current += 1;
        self.write_token_pair(access_token, refresh_token);
        true
    }

    /// Persist a full session in one write
    pub fn set_auth_data(&self, user_id: &str, access_token: &str, refresh_token: &str) {
        self.change_tokens(|| {
            self.write_many(&[
                (AuthConfig::USER_ID_KEY, user_id),
                (AuthConfig::ACCESS_TOKEN_KEY, access_token),
                (AuthConfig::REFRESH_TOKEN_KEY, refresh_token),
            ]);
        });
    }

    /// Remove user id and both tokens in one write
    pub fn clear_auth_data(&self) {
        debug!("Clearing stored auth data");
        self.change_tokens(|| self.delete_many(&Self::AUTH_KEYS));
    }

    /// Clear auth data only if the tokens are unchanged since `epoch`
    pub fn clear_auth_data_if(&self, epoch: u64) -> bool {
        let mut current = self.lock_epoch();
        if *current != epoch {
            return false;
        }
        debug!("Clearing stored auth data");
        *current += 1;
        self.delete_many(&Self::AUTH_KEYS);
        true
    }

    /// Both tokens present. Expiry is not checked.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some() && self.refresh_token().is_some()
    }

    /// The persisted session, if both tokens are present
    pub fn session(&self) -> Option<StoredSession> {
        Some(StoredSession {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            user_id: self.user_id(),
        })
    }
}
