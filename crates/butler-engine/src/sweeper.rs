//! Background expiry sweep for pending confirmations.
//!
//! Expiry is already enforced on read; the sweep only keeps abandoned
//! entries from accumulating.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::confirmation::ConfirmationStore;

/// Periodically purges expired confirmations until cancelled.
pub struct ConfirmationSweeper {
    store: Arc<ConfirmationStore>,
    interval: Duration,
}

impl ConfirmationSweeper {
    pub fn new(store: Arc<ConfirmationStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    /// Run the sweep loop. Returns once `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "Confirmation sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let purged = self.store.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired confirmations purged");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Confirmation sweeper stopped");
                    return;
                }
            }
        }
    }
}
