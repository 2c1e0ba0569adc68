//! Storage strategies
//!
//! A storage backend is a key-value surface with `get`/`set`/`remove`.
//! Backends come in two calling conventions: [`StorageSync`] for
//! synchronous backends and [`Storage`] for asynchronous ones. The
//! convention is fixed once, at resolution time, by wrapping the backend
//! in the matching arm of [`StorageDriver`]; after that every call is
//! dispatched through the arm it was resolved into.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStorage`]: synchronous in-process map, useful for tests and
//!   ephemeral sessions
//! - [`FileStorage`]: asynchronous file-per-key backend with atomic
//!   writes (temp file, then rename)

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::future::BoxFuture;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::PersistError;

/// Asynchronous storage backend
pub trait Storage: Send + Sync {
    /// Read the entry at `key`, `None` if absent
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Write `data` under `key`, replacing any existing entry
    fn set<'a>(&'a self, key: &'a str, data: String) -> BoxFuture<'a, Result<()>>;

    /// Remove the entry at `key`; removing an absent key is not an error
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Synchronous storage backend
pub trait StorageSync: Send + Sync {
    /// Read the entry at `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `data` under `key`, replacing any existing entry
    fn set(&self, key: &str, data: String) -> Result<()>;

    /// Remove the entry at `key`; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// A storage backend resolved into its calling convention
pub enum StorageDriver {
    /// Backend invoked synchronously
    Sync(Box<dyn StorageSync>),
    /// Backend invoked through `await`
    Async(Box<dyn Storage>),
}

impl StorageDriver {
    /// Wrap a synchronous backend
    pub fn sync<S: StorageSync + 'static>(backend: S) -> Self {
        StorageDriver::Sync(Box::new(backend))
    }

    /// Wrap an asynchronous backend
    pub fn r#async<S: Storage + 'static>(backend: S) -> Self {
        StorageDriver::Async(Box::new(backend))
    }

    /// Whether calls to this backend suspend
    pub fn is_async(&self) -> bool {
        matches!(self, StorageDriver::Async(_))
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let result = match self {
            StorageDriver::Sync(s) => s.get(key),
            StorageDriver::Async(s) => s.get(key).await,
        };
        result.map_err(PersistError::Storage)
    }

    pub(crate) async fn set(&self, key: &str, data: String) -> Result<(), PersistError> {
        let result = match self {
            StorageDriver::Sync(s) => s.set(key, data),
            StorageDriver::Async(s) => s.set(key, data).await,
        };
        result.map_err(PersistError::Storage)
    }

    pub(crate) async fn remove(&self, key: &str) -> Result<(), PersistError> {
        let result = match self {
            StorageDriver::Sync(s) => s.remove(key),
            StorageDriver::Async(s) => s.remove(key).await,
        };
        result.map_err(PersistError::Storage)
    }
}

/// In-memory key-value storage
///
/// Clones share the same underlying map, so a clone handed to a session
/// can be inspected from the outside while the session runs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry without going through the strategy interface
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the storage holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory storage mutex poisoned"))
    }
}

impl StorageSync for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, data: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), data);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-per-key storage under a data directory
///
/// Keys may contain characters that are not valid in file names
/// (structural keys do), so each key is encoded with URL-safe base64
/// before it becomes a file name. Writes are atomic: data goes to a
/// temp file in the same directory which is then renamed over the
/// target, so an entry is never observable half-written.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`; the directory is created on
    /// first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory entries are stored under
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.entry", URL_SAFE_NO_PAD.encode(key)))
    }
}

impl Storage for FileStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let path = self.entry_path(key);
            match fs::read_to_string(&path).await {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => {
                    Err(anyhow::Error::new(e).context(format!("failed to read {:?}", path)))
                }
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, data: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.entry_path(key);
            atomic_write(&path, data.as_bytes()).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.entry_path(key);
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => {
                    Err(anyhow::Error::new(e).context(format!("failed to remove {:?}", path)))
                }
            }
        })
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path)
        .await
        .with_context(|| format!("failed to create temp file {:?}", temp_path))?;
    file.write_all(data)
        .await
        .with_context(|| format!("failed to write temp file {:?}", temp_path))?;
    file.sync_all()
        .await
        .with_context(|| format!("failed to sync temp file {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}
