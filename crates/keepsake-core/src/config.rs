//! Session configuration
//!
//! [`PersistOptions`] collects everything a session can be tuned with.
//! Every option is optional: the zero-configuration path derives the
//! storage key from the state's shape, keeps JSON files under the
//! platform data directory, debounces writes by 100 ms, and migrates
//! the storage entry when the state's shape changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::strategy::{
    MergeDriver, Merger, MergerSync, SerializerDriver, Serializer, SerializerSync, Storage,
    StorageDriver, StorageSync, Supplied,
};

/// Default debounce window for change-driven writes
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Predicate deciding whether a change is worth writing
///
/// Receives the previous and current snapshot projections; a write is
/// scheduled only when it returns `true`.
pub type ShouldPersist = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Options for [`Session::initialize`](crate::Session::initialize)
pub struct PersistOptions {
    pub(crate) key: Option<String>,
    pub(crate) storage: Option<Supplied<StorageDriver>>,
    pub(crate) serializer: Option<Supplied<SerializerDriver>>,
    pub(crate) merger: Option<Supplied<MergeDriver>>,
    pub(crate) should_persist: Option<ShouldPersist>,
    pub(crate) debounce_time: Duration,
    pub(crate) update_storage_key_on_structure_change: bool,
    pub(crate) data_dir: PathBuf,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key: None,
            storage: None,
            serializer: None,
            merger: None,
            should_persist: None,
            debounce_time: DEFAULT_DEBOUNCE,
            update_storage_key_on_structure_change: true,
            data_dir: default_data_dir(),
        }
    }
}

impl PersistOptions {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit storage key instead of deriving one
    ///
    /// An explicit key also disables structural migration: the entry
    /// stays under this key no matter how the state's shape changes.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Use an asynchronous storage backend
    pub fn storage<S: Storage + 'static>(mut self, backend: S) -> Self {
        self.storage = Some(Supplied::Ready(StorageDriver::r#async(backend)));
        self
    }

    /// Use a synchronous storage backend
    pub fn storage_sync<S: StorageSync + 'static>(mut self, backend: S) -> Self {
        self.storage = Some(Supplied::Ready(StorageDriver::sync(backend)));
        self
    }

    /// Construct the storage backend lazily, at session initialization
    pub fn storage_with(mut self, build: fn() -> StorageDriver) -> Self {
        self.storage = Some(Supplied::Construct(build));
        self
    }

    /// Use an asynchronous serializer
    pub fn serializer<S: Serializer + 'static>(mut self, codec: S) -> Self {
        self.serializer = Some(Supplied::Ready(SerializerDriver::r#async(codec)));
        self
    }

    /// Use a synchronous serializer
    pub fn serializer_sync<S: SerializerSync + 'static>(mut self, codec: S) -> Self {
        self.serializer = Some(Supplied::Ready(SerializerDriver::sync(codec)));
        self
    }

    /// Construct the serializer lazily, at session initialization
    pub fn serializer_with(mut self, build: fn() -> SerializerDriver) -> Self {
        self.serializer = Some(Supplied::Construct(build));
        self
    }

    /// Use an asynchronous merge strategy
    pub fn merger<M: Merger + 'static>(mut self, merger: M) -> Self {
        self.merger = Some(Supplied::Ready(MergeDriver::r#async(merger)));
        self
    }

    /// Use a synchronous merge strategy
    pub fn merger_sync<M: MergerSync + 'static>(mut self, merger: M) -> Self {
        self.merger = Some(Supplied::Ready(MergeDriver::sync(merger)));
        self
    }

    /// Construct the merge strategy lazily, at session initialization
    pub fn merger_with(mut self, build: fn() -> MergeDriver) -> Self {
        self.merger = Some(Supplied::Construct(build));
        self
    }

    /// Gate writes on a predicate over (previous, current) snapshots
    pub fn should_persist<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.should_persist = Some(Arc::new(predicate));
        self
    }

    /// Debounce window for change-driven writes (default 100 ms)
    pub fn debounce_time(mut self, window: Duration) -> Self {
        self.debounce_time = window;
        self
    }

    /// Migrate the storage entry when the state's shape changes
    /// (default `true`; ignored when an explicit key is set)
    pub fn update_storage_key_on_structure_change(mut self, enabled: bool) -> Self {
        self.update_storage_key_on_structure_change = enabled;
        self
    }

    /// Root directory for the default file storage
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keepsake")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PersistOptions::default();
        assert!(options.key.is_none());
        assert!(options.storage.is_none());
        assert!(options.should_persist.is_none());
        assert_eq!(options.debounce_time, Duration::from_millis(100));
        assert!(options.update_storage_key_on_structure_change);
        assert!(options.data_dir.ends_with("keepsake"));
    }

    #[test]
    fn test_builder_sets_fields() {
        let options = PersistOptions::new()
            .key("settings")
            .debounce_time(Duration::from_millis(250))
            .update_storage_key_on_structure_change(false)
            .data_dir("/tmp/keepsake-test");

        assert_eq!(options.key.as_deref(), Some("settings"));
        assert_eq!(options.debounce_time, Duration::from_millis(250));
        assert!(!options.update_storage_key_on_structure_change);
        assert_eq!(options.data_dir, PathBuf::from("/tmp/keepsake-test"));
    }

    #[test]
    fn test_should_persist_predicate_is_stored() {
        let options = PersistOptions::new().should_persist(|prev, curr| prev != curr);
        let predicate = options.should_persist.expect("predicate set");

        let a = serde_json::json!({"n": 1});
        let b = serde_json::json!({"n": 2});
        assert!(!predicate(&a, &a));
        assert!(predicate(&a, &b));
    }
}
