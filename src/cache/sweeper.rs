//! Background eviction timer.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::ExpiringStore;

/// Owns the periodic eviction task. Dropping the handle stops the task.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to wind down.
    pub async fn stop(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl ExpiringStore {
    /// Start the periodic eviction scan on the current tokio runtime.
    ///
    /// The task holds only a weak reference to the store: it exits on the
    /// first tick after the store is dropped or disposed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let store = Arc::downgrade(self);
        let period = self.config().effective_polling_interval();

        info!(
            polling_interval_ms = period.as_millis() as u64,
            sliding_expiration_ms = self.sliding_expiration().as_millis() as u64,
            "Starting eviction sweeper"
        );

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                if store.is_disposed() {
                    break;
                }
                store.sweep_expired();
            }
            debug!("Eviction sweeper stopped");
        });

        SweeperHandle { handle }
    }
}
