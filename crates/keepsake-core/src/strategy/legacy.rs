//! Backward compatibility for the old storage interface
//!
//! Earlier versions of the storage surface used `get_item` /
//! `set_item` / `remove_item`. [`LegacyAdapter`] lets such a backend
//! keep working behind the current [`StorageSync`] trait: each method
//! delegates to its old-name counterpart and emits a deprecation
//! notice on the diagnostic channel the first time it is called on a
//! given adapter. Beyond the notice, behavior is unchanged.

use std::sync::Once;

use anyhow::Result;
use tracing::warn;

use super::storage::StorageSync;

/// The pre-1.0 storage interface
pub trait LegacyStorage: Send + Sync {
    /// Old name for `get`
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Old name for `set`
    fn set_item(&self, key: &str, data: String) -> Result<()>;

    /// Old name for `remove`
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Adapter exposing a [`LegacyStorage`] backend through [`StorageSync`]
pub struct LegacyAdapter<S> {
    inner: S,
    get_notice: Once,
    set_notice: Once,
    remove_notice: Once,
}

impl<S: LegacyStorage> LegacyAdapter<S> {
    /// Wrap a legacy backend
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_notice: Once::new(),
            set_notice: Once::new(),
            remove_notice: Once::new(),
        }
    }

    /// The wrapped backend
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: LegacyStorage> StorageSync for LegacyAdapter<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_notice.call_once(|| {
            warn!("storage backend implements deprecated get_item; implement get instead");
        });
        self.inner.get_item(key)
    }

    fn set(&self, key: &str, data: String) -> Result<()> {
        self.set_notice.call_once(|| {
            warn!("storage backend implements deprecated set_item; implement set instead");
        });
        self.inner.set_item(key, data)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_notice.call_once(|| {
            warn!("storage backend implements deprecated remove_item; implement remove instead");
        });
        self.inner.remove_item(key)
    }
}
