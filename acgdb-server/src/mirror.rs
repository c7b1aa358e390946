use acgdb::Store;

use tokio::sync::watch;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{error, info};

use std::sync::Arc;

/// Handles mirroring the store to the disk.
/// Saves every changed table every <interval> seconds until the application starts stopping.
pub async fn mirror_handler(store: Arc<Store>, interval: u64, mut stopping: watch::Receiver<bool>) {
    let mut ticker = time::interval(Duration::from_secs(interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately, right after `init`.
    ticker.tick().await;

    while !*stopping.borrow() {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = store.flush().await {
                    error!(error = %e, "periodic save failed");
                }
            }
            _ = stopping.changed() => break,
        }
    }

    info!("mirror stopped");
}
