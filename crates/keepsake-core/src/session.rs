//! Persistence session
//!
//! [`Session::initialize`] is the entry point of the crate: it resolves
//! the strategies, computes the storage key (explicit or derived from
//! the state's shape), loads and merges any previously stored data,
//! seeds the live store, and spawns the change observer. The returned
//! session is the handle for the explicit operations: `persist`,
//! `restore`, `clear`, `dispose`.
//!
//! ## Key lifecycle
//!
//! Without an explicit key the session key is `shape_key(initial)` and
//! follows the state's shape: when a change alters the shape, the
//! observer moves the storage entry to the new derived key. An explicit
//! key pins the entry for the whole session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::config::{PersistOptions, ShouldPersist};
use crate::error::PersistError;
use crate::observer::{self, ObserverCommand, ObserverContext};
use crate::shape::shape_key;
use crate::store::ReactiveStore;
use crate::strategy::{resolve_strategies, StrategySet};

/// Per-session mutable state, shared with the observer task
pub(crate) struct SessionState {
    /// Key the storage entry currently lives under
    pub(crate) key: String,
    /// Whether the caller supplied the key (disables migration)
    pub(crate) explicit_key: bool,
    /// Last snapshot the persistence predicate saw
    pub(crate) previous: Value,
    /// The original initial state, the merge base for `restore`
    pub(crate) initial: Value,
}

/// A live state value bound to a storage entry
///
/// Dropping the session (or calling [`Session::dispose`]) stops the
/// change-driven write-back; store clones handed out earlier keep
/// working as plain observable cells.
pub struct Session<T> {
    store: ReactiveStore<T>,
    state: Arc<Mutex<SessionState>>,
    strategies: Arc<StrategySet>,
    should_persist: ShouldPersist,
    command_tx: mpsc::Sender<ObserverCommand>,
}

impl<T> Session<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Build a session around an initial state
    ///
    /// Loads the storage entry at the session key; if data is present
    /// and deserializes to something usable, it is merged with
    /// `initial` and the result seeds the live store. Otherwise the
    /// store starts from `initial` unchanged.
    pub async fn initialize(initial: T, options: PersistOptions) -> Result<Self, PersistError> {
        let PersistOptions {
            key,
            storage,
            serializer,
            merger,
            should_persist,
            debounce_time,
            update_storage_key_on_structure_change,
            data_dir,
        } = options;

        let initial_value =
            serde_json::to_value(&initial).map_err(PersistError::serialization)?;
        let strategies = Arc::new(resolve_strategies(storage, serializer, merger, &data_dir));

        let (key, explicit_key) = match key {
            Some(key) => (key, true),
            None => (shape_key(&initial_value), false),
        };

        let stored = match strategies.storage.get(&key).await? {
            Some(raw) => strategies.serializer.deserialize(&raw).await?,
            None => None,
        };
        let seeded = match stored {
            Some(stored) => strategies.merger.merge(&initial_value, stored).await?,
            None => None,
        };

        let (start, start_value) = match seeded {
            Some(merged) => {
                let typed: T = serde_json::from_value(merged.clone())
                    .map_err(PersistError::serialization)?;
                (typed, merged)
            }
            None => (initial, initial_value.clone()),
        };

        debug!(%key, explicit = explicit_key, "session initialized");

        let store = ReactiveStore::new(start);
        let state = Arc::new(Mutex::new(SessionState {
            key,
            explicit_key,
            previous: start_value,
            initial: initial_value,
        }));
        let should_persist: ShouldPersist =
            should_persist.unwrap_or_else(|| Arc::new(|_, _| true));

        let (command_tx, command_rx) = mpsc::channel(4);
        tokio::spawn(observer::run(
            store.subscribe(),
            command_rx,
            ObserverContext {
                state: state.clone(),
                strategies: strategies.clone(),
                should_persist: should_persist.clone(),
                debounce: debounce_time,
                migrate_on_shape_change: update_storage_key_on_structure_change,
            },
        ));

        Ok(Self {
            store,
            state,
            strategies,
            should_persist,
            command_tx,
        })
    }

    /// The live store; clones address the same cell
    pub fn store(&self) -> ReactiveStore<T> {
        self.store.clone()
    }

    /// The key the storage entry currently lives under
    pub async fn current_key(&self) -> String {
        self.state.lock().await.key.clone()
    }

    /// Write the current snapshot to storage, bypassing the debounce
    ///
    /// No-op when the persistence predicate rejects the snapshot.
    pub async fn persist(&self) -> Result<(), PersistError> {
        let snapshot =
            serde_json::to_value(self.store.snapshot()).map_err(PersistError::serialization)?;

        let state = self.state.lock().await;
        if !(self.should_persist)(&state.previous, &snapshot) {
            return Ok(());
        }

        let data = self.strategies.serializer.serialize(&snapshot).await?;
        self.strategies.storage.set(&state.key, data).await
    }

    /// Re-read storage and apply the result onto the live store
    ///
    /// Stored data is merged against the *original* initial state, not
    /// the current live values, then replaced into the store in place —
    /// subscribers stay attached. Returns `Ok(false)` when nothing is
    /// stored or the merge yields nothing usable.
    pub async fn restore(&self) -> Result<bool, PersistError> {
        let (key, initial) = {
            let state = self.state.lock().await;
            (state.key.clone(), state.initial.clone())
        };

        let Some(raw) = self.strategies.storage.get(&key).await? else {
            return Ok(false);
        };
        let Some(stored) = self.strategies.serializer.deserialize(&raw).await? else {
            return Ok(false);
        };
        let Some(merged) = self.strategies.merger.merge(&initial, stored).await? else {
            return Ok(false);
        };

        let value: T = serde_json::from_value(merged).map_err(PersistError::serialization)?;
        self.store.replace(value);
        Ok(true)
    }

    /// Remove the storage entry at the current key
    ///
    /// In-memory state is left untouched.
    pub async fn clear(&self) -> Result<(), PersistError> {
        let key = self.state.lock().await.key.clone();
        self.strategies.storage.remove(&key).await
    }

    /// Stop the change observer
    ///
    /// After this, changes to the store are no longer written back;
    /// the explicit operations keep working. Idempotent.
    pub async fn dispose(&self) {
        let _ = self.command_tx.send(ObserverCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{MemoryStorage, StorageSync};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AppState {
        count: u32,
        text: String,
    }

    fn app_state() -> AppState {
        AppState {
            count: 1,
            text: "hello".to_string(),
        }
    }

    // Derived key for AppState's shape
    const APP_KEY: &str = "{count:num,text:str}";

    /// Storage wrapper counting writes, for debounce assertions
    #[derive(Clone)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: Arc<AtomicUsize>,
    }

    impl CountingStorage {
        fn new(inner: MemoryStorage) -> Self {
            Self {
                inner,
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl StorageSync for CountingStorage {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, data: String) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, data)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }
    }

    fn options_with(storage: &CountingStorage) -> PersistOptions {
        PersistOptions::new()
            .storage_sync(storage.clone())
            .debounce_time(Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_restore_returns_false_when_nothing_stored() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        assert!(!session.restore().await.unwrap());
    }

    #[tokio::test]
    async fn test_derived_key_matches_shape() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        assert_eq!(session.current_key().await, APP_KEY);
    }

    #[tokio::test]
    async fn test_initialize_merges_stored_data() {
        let mem = MemoryStorage::new();
        mem.set(APP_KEY, r#"{"count":5,"text":"saved"}"#.to_string())
            .unwrap();

        let storage = CountingStorage::new(mem);
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        let state = session.store().snapshot();
        assert_eq!(state.count, 5);
        assert_eq!(state.text, "saved");
    }

    #[tokio::test]
    async fn test_initialize_without_stored_data_keeps_initial() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        assert_eq!(session.store().snapshot(), app_state());
        // Initialization alone never writes
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_debounced_changes_coalesce_into_one_write() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();
        let store = session.store();

        for _ in 0..5 {
            store.update(|s| s.count += 1);
        }
        sleep(Duration::from_millis(200)).await;

        assert_eq!(storage.write_count(), 1);
        let stored: AppState =
            serde_json::from_str(&storage.inner.entry(APP_KEY).unwrap()).unwrap();
        assert_eq!(stored.count, 6);
    }

    #[tokio::test]
    async fn test_each_debounce_window_writes_once() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();
        let store = session.store();

        store.update(|s| s.count = 10);
        sleep(Duration::from_millis(120)).await;
        store.update(|s| s.count = 20);
        sleep(Duration::from_millis(120)).await;

        assert_eq!(storage.write_count(), 2);
        let stored: AppState =
            serde_json::from_str(&storage.inner.entry(APP_KEY).unwrap()).unwrap();
        assert_eq!(stored.count, 20);
    }

    #[tokio::test]
    async fn test_rejecting_predicate_blocks_writes() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let options = options_with(&storage).should_persist(|_, _| false);
        let session = Session::initialize(app_state(), options).await.unwrap();
        let store = session.store();

        for _ in 0..5 {
            store.update(|s| s.count += 1);
        }
        sleep(Duration::from_millis(200)).await;

        assert_eq!(storage.write_count(), 0);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Growable {
        a: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        b: Option<String>,
    }

    #[tokio::test]
    async fn test_shape_drift_migrates_the_storage_entry() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(Growable { a: 1, b: None }, options_with(&storage))
            .await
            .unwrap();
        let store = session.store();

        // Settle an entry under the initial shape's key
        store.update(|s| s.a = 2);
        sleep(Duration::from_millis(120)).await;
        assert!(storage.inner.entry("{a:num}").is_some());

        // Growing a field changes the shape; the entry must follow
        store.update(|s| s.b = Some("x".to_string()));
        sleep(Duration::from_millis(120)).await;

        assert!(storage.inner.entry("{a:num}").is_none());
        let moved: Growable =
            serde_json::from_str(&storage.inner.entry("{a:num,b:str}").unwrap()).unwrap();
        assert_eq!(moved.b.as_deref(), Some("x"));
        assert_eq!(session.current_key().await, "{a:num,b:str}");
    }

    #[tokio::test]
    async fn test_explicit_key_pins_the_entry() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let options = options_with(&storage).key("growable");
        let session = Session::initialize(Growable { a: 1, b: None }, options)
            .await
            .unwrap();
        let store = session.store();

        store.update(|s| s.a = 2);
        sleep(Duration::from_millis(120)).await;
        store.update(|s| s.b = Some("x".to_string()));
        sleep(Duration::from_millis(120)).await;

        assert!(storage.inner.entry("growable").is_some());
        assert!(storage.inner.entry("{a:num,b:str}").is_none());
        assert_eq!(session.current_key().await, "growable");
    }

    #[tokio::test]
    async fn test_migration_disabled_keeps_the_derived_key() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let options = options_with(&storage).update_storage_key_on_structure_change(false);
        let session = Session::initialize(Growable { a: 1, b: None }, options)
            .await
            .unwrap();
        let store = session.store();

        store.update(|s| s.b = Some("x".to_string()));
        sleep(Duration::from_millis(120)).await;

        // Entry written under the original derived key, none under the new shape
        assert!(storage.inner.entry("{a:num}").is_some());
        assert!(storage.inner.entry("{a:num,b:str}").is_none());
    }

    #[tokio::test]
    async fn test_explicit_persist_writes_immediately() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        session.persist().await.unwrap();

        assert_eq!(storage.write_count(), 1);
        let stored: AppState =
            serde_json::from_str(&storage.inner.entry(APP_KEY).unwrap()).unwrap();
        assert_eq!(stored, app_state());
    }

    #[tokio::test]
    async fn test_clear_removes_entry_and_keeps_live_state() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();

        session.persist().await.unwrap();
        assert!(storage.inner.entry(APP_KEY).is_some());

        session.clear().await.unwrap();
        assert!(storage.inner.entry(APP_KEY).is_none());
        assert_eq!(session.store().snapshot(), app_state());
    }

    #[tokio::test]
    async fn test_restore_applies_stored_data_in_place() {
        let storage = CountingStorage::new(MemoryStorage::new());
        // Wide debounce keeps the write-back out of this test's way
        let options = options_with(&storage).debounce_time(Duration::from_millis(500));
        let session = Session::initialize(app_state(), options).await.unwrap();
        let store = session.store();
        let mut rx = store.subscribe();

        session.persist().await.unwrap();
        store.update(|s| s.count = 99);

        assert!(session.restore().await.unwrap());
        assert_eq!(store.snapshot(), app_state());

        // The pre-existing subscriber observed the restore
        rx.changed().await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_merges_against_original_initial_state() {
        let mem = MemoryStorage::new();
        // Stored data predates the `text` field
        mem.set(APP_KEY, r#"{"count":5}"#.to_string()).unwrap();

        let storage = CountingStorage::new(mem);
        // Wide debounce keeps the write-back out of this test's way
        let options = options_with(&storage).debounce_time(Duration::from_millis(500));
        let session = Session::initialize(app_state(), options).await.unwrap();
        let store = session.store();

        store.update(|s| s.text = "mutated".to_string());
        assert!(session.restore().await.unwrap());

        // Missing fields come from the original initial state, not the
        // current live values
        let state = store.snapshot();
        assert_eq!(state.count, 5);
        assert_eq!(state.text, "hello");
    }

    #[tokio::test]
    async fn test_dispose_stops_the_write_back() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(app_state(), options_with(&storage))
            .await
            .unwrap();
        let store = session.store();

        session.dispose().await;
        sleep(Duration::from_millis(20)).await;

        store.update(|s| s.count += 1);
        sleep(Duration::from_millis(200)).await;

        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_default_flow() {
        let storage = CountingStorage::new(MemoryStorage::new());
        let session = Session::initialize(
            app_state(),
            PersistOptions::new().storage_sync(storage.clone()),
        )
        .await
        .unwrap();

        session.store().update(|s| s.count += 1);
        sleep(Duration::from_millis(300)).await;

        let stored: AppState =
            serde_json::from_str(&storage.inner.entry(APP_KEY).unwrap()).unwrap();
        assert_eq!(
            stored,
            AppState {
                count: 2,
                text: "hello".to_string()
            }
        );
    }
}
