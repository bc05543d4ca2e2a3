// Path: crates/watcher/src/status.rs
use crate::chain_state::ChainStateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Logs the number of nodes reported by the feed every `interval` until shutdown.
pub async fn run_status_reporter(
    store: Arc<ChainStateStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() { break; }
            }
            _ = ticker.tick() => {
                tracing::info!(target: "status", nodes = store.node_count(), "Telemetry status");
            }
        }
    }
}
