//! Background expiry sweeper.

use super::VectorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Purge expired records every `interval` until the returned handle is
/// aborted. Failures are logged and the sweeper keeps running.
pub fn spawn_sweeper(store: Arc<dyn VectorStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(?interval, "expiry sweeper started");
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "sweeper purged expired records"),
                Err(e) => tracing::error!("expiry sweep failed: {e}"),
            }
        }
    })
}
