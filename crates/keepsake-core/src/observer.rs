//! Change observer task
//!
//! One observer task runs per session. It owns the store subscription
//! and handles every change notification in order, which makes it the
//! session's single-flight queue: a notification whose storage calls
//! suspend simply delays the next one, so key migrations and predicate
//! evaluations never interleave within a session.
//!
//! Per notification the task recomputes the structural key (migrating
//! the storage entry if the shape drifted and no explicit key pins it),
//! evaluates the persistence predicate, and arms the trailing-edge
//! debounce deadline. When the deadline elapses it writes the latest
//! snapshot. Failures here have no caller to surface to; they are
//! logged as warnings and the task keeps observing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::ShouldPersist;
use crate::error::PersistError;
use crate::session::SessionState;
use crate::shape::shape_key;
use crate::strategy::StrategySet;

/// Commands sent to the observer task
#[derive(Debug)]
pub(crate) enum ObserverCommand {
    /// Stop observing and end the task
    Shutdown,
}

/// Everything the observer task needs, shared with the session handle
pub(crate) struct ObserverContext {
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) strategies: Arc<StrategySet>,
    pub(crate) should_persist: ShouldPersist,
    pub(crate) debounce: Duration,
    pub(crate) migrate_on_shape_change: bool,
}

/// Observer task main loop
pub(crate) async fn run<T>(
    mut changes: watch::Receiver<T>,
    mut commands: mpsc::Receiver<ObserverCommand>,
    ctx: ObserverContext,
) where
    T: Clone + Serialize + Send + Sync + 'static,
{
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    // Every store handle is gone
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                match serde_json::to_value(&snapshot) {
                    Ok(value) => handle_change(&ctx, value, &mut deadline).await,
                    Err(e) => warn!("skipping unprojectable snapshot: {e}"),
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                flush(&ctx, &changes).await;
            }
            cmd = commands.recv() => {
                if matches!(cmd, Some(ObserverCommand::Shutdown) | None) {
                    break;
                }
            }
        }
    }
}

/// Handle one change notification: migration check, persistence check,
/// previous-snapshot bookkeeping
async fn handle_change(ctx: &ObserverContext, value: Value, deadline: &mut Option<Instant>) {
    let mut state = ctx.state.lock().await;

    if !state.explicit_key && ctx.migrate_on_shape_change {
        let derived = shape_key(&value);
        if derived != state.key {
            match migrate(ctx, &state.key, &derived, &value).await {
                Ok(()) => {
                    debug!(from = %state.key, to = %derived, "storage key migrated");
                    state.key = derived;
                }
                Err(e) => warn!("storage key migration failed: {e}"),
            }
        }
    }

    if (ctx.should_persist)(&state.previous, &value) {
        *deadline = Some(Instant::now() + ctx.debounce);
    }

    // Unconditional, whatever the migration and predicate decided
    state.previous = value;
}

/// Move the storage entry from `old_key` to `new_key`
async fn migrate(
    ctx: &ObserverContext,
    old_key: &str,
    new_key: &str,
    value: &Value,
) -> Result<(), PersistError> {
    let data = ctx.strategies.serializer.serialize(value).await?;
    ctx.strategies.storage.remove(old_key).await?;
    ctx.strategies.storage.set(new_key, data).await?;
    Ok(())
}

/// Debounce window elapsed: write the latest snapshot
async fn flush<T>(ctx: &ObserverContext, changes: &watch::Receiver<T>)
where
    T: Clone + Serialize,
{
    let snapshot = changes.borrow().clone();
    let value = match serde_json::to_value(&snapshot) {
        Ok(value) => value,
        Err(e) => {
            warn!("skipping unprojectable snapshot: {e}");
            return;
        }
    };

    let state = ctx.state.lock().await;
    let written = async {
        let data = ctx.strategies.serializer.serialize(&value).await?;
        ctx.strategies.storage.set(&state.key, data).await
    }
    .await;

    match written {
        Ok(()) => debug!(key = %state.key, "state written"),
        Err(e) => warn!("debounced write failed: {e}"),
    }
}
