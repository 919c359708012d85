//! Periodic sweep that re-enqueues events orphaned by dead workers.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::EventQueue;

pub struct StaleEventSweeper {
    queue: Arc<dyn EventQueue>,
    interval: Duration,
}

impl StaleEventSweeper {
    pub fn new(queue: Arc<dyn EventQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Sweep every `interval` until shutdown is signaled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "StaleEventSweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("StaleEventSweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.queue.recover_stale().await {
                        Ok(0) => debug!("No stale in-flight events"),
                        Ok(n) => warn!(recovered = n, "Recovered stale in-flight events"),
                        Err(e) => error!(error = %e, "Stale event sweep failed"),
                    }
                }
            }
        }

        info!("StaleEventSweeper shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::fixtures;
    use crate::config::QueueConfig;
    use crate::events::QueuedEvent;
    use crate::queue::MemoryEventQueue;

    #[tokio::test(start_paused = true)]
    async fn sweeps_until_shutdown() {
        let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
        queue
            .push(QueuedEvent::account_update(fixtures::address(1), 1, vec![]))
            .await
            .unwrap();
        let popped = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = StaleEventSweeper::new(queue.clone(), Duration::from_secs(30));
        let handle = tokio::spawn(sweeper.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(275)).await;
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.processing_count, 0);
        assert_eq!(stats.queue_length, 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        let again = queue.pop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(again.id, popped.id);
    }
}
