//! Merge strategies
//!
//! On load, stored data is merged against the caller's initial state
//! before it seeds the live store. The merge decides how stale stored
//! data meets a possibly newer initial shape. `Ok(None)` means the
//! merge produced nothing usable, which callers treat as "nothing
//! restored", not as an error.

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::PersistError;

/// Asynchronous merge strategy
pub trait Merger: Send + Sync {
    /// Merge stored data into the initial state
    fn merge<'a>(
        &'a self,
        initial: &'a Value,
        stored: Value,
    ) -> BoxFuture<'a, Result<Option<Value>>>;
}

/// Synchronous merge strategy
pub trait MergerSync: Send + Sync {
    /// Merge stored data into the initial state
    fn merge(&self, initial: &Value, stored: Value) -> Result<Option<Value>>;
}

/// A merge strategy resolved into its calling convention
pub enum MergeDriver {
    /// Strategy invoked synchronously
    Sync(Box<dyn MergerSync>),
    /// Strategy invoked through `await`
    Async(Box<dyn Merger>),
}

impl MergeDriver {
    /// Wrap a synchronous strategy
    pub fn sync<M: MergerSync + 'static>(merger: M) -> Self {
        MergeDriver::Sync(Box::new(merger))
    }

    /// Wrap an asynchronous strategy
    pub fn r#async<M: Merger + 'static>(merger: M) -> Self {
        MergeDriver::Async(Box::new(merger))
    }

    /// Whether calls to this strategy suspend
    pub fn is_async(&self) -> bool {
        matches!(self, MergeDriver::Async(_))
    }

    pub(crate) async fn merge(
        &self,
        initial: &Value,
        stored: Value,
    ) -> Result<Option<Value>, PersistError> {
        let result = match self {
            MergeDriver::Sync(m) => m.merge(initial, stored),
            MergeDriver::Async(m) => m.merge(initial, stored).await,
        };
        result.map_err(PersistError::Merge)
    }
}

/// Default merge: stored top-level fields overlay the initial object
///
/// Fields present in the initial state but missing from storage keep
/// their initial values, so a state struct can grow new fields without
/// old stored data becoming unloadable. Non-object stored values win
/// wholesale; a stored `null` yields nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerge;

impl ShallowMerge {
    /// Create the strategy
    pub fn new() -> Self {
        Self
    }
}

impl MergerSync for ShallowMerge {
    fn merge(&self, initial: &Value, stored: Value) -> Result<Option<Value>> {
        match (initial, stored) {
            (_, Value::Null) => Ok(None),
            (Value::Object(base), Value::Object(overlay)) => {
                let mut merged = base.clone();
                for (key, value) in overlay {
                    merged.insert(key, value);
                }
                Ok(Some(Value::Object(merged)))
            }
            (_, stored) => Ok(Some(stored)),
        }
    }
}
