// src/core/presence/sweeper.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use super::PresenceStore;

/// Background task that periodically flips stale presence records offline.
pub struct PresenceSweeperTask {
    store: Arc<PresenceStore>,
    interval: Duration,
}

impl PresenceSweeperTask {
    pub fn new(store: Arc<PresenceStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("presence sweeper task started.");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.store.sweep();
                }
                _ = shutdown_rx.recv() => {
                    info!("presence sweeper task shutting down.");
                    return;
                }
            }
        }
    }
}
