//! Pluggable strategies
//!
//! A session runs on three strategies: storage, serialization, and
//! merge. Each may be supplied ready-made or as a zero-argument
//! constructor, and each may be synchronous or asynchronous; the
//! resolver normalizes whatever was supplied into one concrete driver
//! per slot. The sync-or-async decision is encoded in the driver enum
//! at resolution time, so a session can never mix calling conventions
//! on the same strategy instance.

pub mod legacy;
pub mod merge;
pub mod serialize;
pub mod storage;

use std::path::Path;

pub use legacy::{LegacyAdapter, LegacyStorage};
pub use merge::{MergeDriver, Merger, MergerSync, ShallowMerge};
pub use serialize::{JsonSerializer, Serializer, SerializerDriver, SerializerSync};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageDriver, StorageSync};

/// A strategy as supplied by the caller: an instance or a constructor
pub enum Supplied<D> {
    /// A ready driver
    Ready(D),
    /// A constructor invoked once at resolution time
    Construct(fn() -> D),
}

impl<D> Supplied<D> {
    /// Produce the concrete driver
    pub fn resolve(self) -> D {
        match self {
            Supplied::Ready(driver) => driver,
            Supplied::Construct(build) => build(),
        }
    }
}

/// The resolved strategies a session runs on
pub struct StrategySet {
    /// Key-value backend
    pub storage: StorageDriver,
    /// Snapshot codec
    pub serializer: SerializerDriver,
    /// Load-time reconciliation
    pub merger: MergeDriver,
}

/// Normalize supplied strategies into a [`StrategySet`], filling unset
/// slots with the defaults: [`FileStorage`] under `data_dir`,
/// [`JsonSerializer`], and [`ShallowMerge`].
pub fn resolve_strategies(
    storage: Option<Supplied<StorageDriver>>,
    serializer: Option<Supplied<SerializerDriver>>,
    merger: Option<Supplied<MergeDriver>>,
    data_dir: &Path,
) -> StrategySet {
    let storage = match storage {
        Some(supplied) => supplied.resolve(),
        None => StorageDriver::r#async(FileStorage::new(data_dir)),
    };
    let serializer = match serializer {
        Some(supplied) => supplied.resolve(),
        None => SerializerDriver::sync(JsonSerializer::new()),
    };
    let merger = match merger {
        Some(supplied) => supplied.resolve(),
        None => MergeDriver::sync(ShallowMerge::new()),
    };

    StrategySet {
        storage,
        serializer,
        merger,
    }
}
