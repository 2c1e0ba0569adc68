//! Keepsake Core Library
//!
//! This crate keeps an in-memory state value synchronized with a
//! durable key-value backend. The caller never has to invent a storage
//! key: by default the key is derived from the *shape* of the state
//! (field names, nesting, value kinds), so the same state struct finds
//! its data again on the next run — and when the shape changes, the
//! storage entry migrates to the new derived key.
//!
//! # Architecture
//!
//! - **Session**: orchestrates load → merge → store construction and
//!   exposes the explicit operations (`persist`, `restore`, `clear`,
//!   `dispose`)
//! - **Observer**: a background task that watches the live store and
//!   writes changes back with trailing-edge debouncing
//! - **Strategies**: storage, serialization, and merge are pluggable,
//!   each synchronous or asynchronous, resolved once per session
//!
//! # Quick Start
//!
//! ```text
//! let session = Session::initialize(
//!     AppState { count: 1, text: "hello".into() },
//!     PersistOptions::default(),
//! ).await?;
//!
//! let store = session.store();
//! store.update(|s| s.count += 1);
//! // ...after the debounce window the change is on disk,
//! // keyed by the state's shape
//! ```
//!
//! # Modules
//!
//! - `session`: session construction and explicit operations (main entry point)
//! - `store`: the observable state cell
//! - `shape`: structural key derivation
//! - `strategy`: storage / serialization / merge strategies and drivers
//! - `config`: session options
//! - `error`: error taxonomy

pub mod config;
pub mod error;
pub mod session;
pub mod shape;
pub mod store;
pub mod strategy;

mod observer;

pub use config::{default_data_dir, PersistOptions, ShouldPersist, DEFAULT_DEBOUNCE};
pub use error::{PersistError, PersistResult};
pub use session::Session;
pub use shape::shape_key;
pub use store::ReactiveStore;
pub use strategy::{
    FileStorage, JsonSerializer, LegacyAdapter, LegacyStorage, MemoryStorage, MergeDriver, Merger,
    MergerSync, Serializer, SerializerDriver, SerializerSync, ShallowMerge, Storage,
    StorageDriver, StorageSync, StrategySet,
};
