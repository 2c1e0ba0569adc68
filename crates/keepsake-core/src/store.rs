//! Live state container
//!
//! [`ReactiveStore`] is a thin observable cell: it hands out owned
//! snapshots and notifies subscribers when the value is replaced or
//! updated in place. It deliberately does *not* track deep mutations;
//! the engine only ever consumes it through `snapshot()` and
//! `subscribe()`, treating reactivity as an injected capability.
//!
//! Clones are cheap and all address the same underlying cell, so a
//! restore that goes through [`ReactiveStore::replace`] is seen by every
//! subscriber that was already attached.

use tokio::sync::watch;

/// Observable cell holding the live state value
pub struct ReactiveStore<T> {
    tx: std::sync::Arc<watch::Sender<T>>,
}

impl<T> Clone for ReactiveStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> ReactiveStore<T> {
    /// Create a store seeded with an initial value
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Take an owned point-in-time copy of the current value
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    /// Mutate the value in place and notify subscribers
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        self.tx.send_modify(f);
    }

    /// Replace the whole value, preserving the cell identity
    ///
    /// Existing subscribers stay attached and observe the replacement
    /// as a regular change.
    pub fn replace(&self, value: T) {
        self.tx.send_modify(|slot| *slot = value);
    }

    /// Subscribe to change notifications
    ///
    /// The current value counts as already seen; only subsequent
    /// changes wake the receiver.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}
