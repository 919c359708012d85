//! Keeps the feed's per-address subscriptions in line with the configured
//! watch list.
//!
//! On every [`ConfigStore`] update the new list is diffed against the
//! addresses this manager subscribed: removed ones are unsubscribed, new
//! ones subscribed. Pinned addresses (markets the process watches for its
//! own reasons) are never unsubscribed by a diff.

use std::collections::BTreeSet;
use tokio::sync::watch;
use tracing::{error, info};

use super::FeedHandle;
use crate::accounts::Address;
use crate::config::{ConfigStore, ConfigWatcher};

pub struct WatchListManager {
    feed: FeedHandle,
    pinned: BTreeSet<Address>,
}

/// Subscribe/unsubscribe sets produced by a diff.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatchDiff {
    pub added: Vec<Address>,
    pub removed: Vec<Address>,
}

pub fn diff_watch_list(
    active: &BTreeSet<Address>,
    wanted: &BTreeSet<Address>,
    pinned: &BTreeSet<Address>,
) -> WatchDiff {
    WatchDiff {
        added: wanted.difference(active).copied().collect(),
        removed: active
            .difference(wanted)
            .filter(|a| !pinned.contains(*a))
            .copied()
            .collect(),
    }
}

impl WatchListManager {
    pub fn new(feed: FeedHandle, pinned: impl IntoIterator<Item = Address>) -> Self {
        Self {
            feed,
            pinned: pinned.into_iter().collect(),
        }
    }

    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        store: ConfigStore<Vec<Address>>,
        mut watcher: ConfigWatcher,
    ) {
        let mut active = BTreeSet::new();
        let initial: BTreeSet<Address> = store.snapshot().await.into_iter().collect();
        self.apply(&mut active, &initial).await;
        info!(addresses = active.len(), "WatchListManager started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("WatchListManager received shutdown signal");
                        break;
                    }
                }

                changed = watcher.changed() => {
                    if changed.is_err() {
                        info!("Watch list store dropped");
                        break;
                    }
                    let wanted: BTreeSet<Address> = store.snapshot().await.into_iter().collect();
                    self.apply(&mut active, &wanted).await;
                    info!(addresses = active.len(), "WatchListManager reconciled watch list");
                }
            }
        }

        info!("WatchListManager shutdown complete");
    }

    async fn apply(&self, active: &mut BTreeSet<Address>, wanted: &BTreeSet<Address>) {
        let diff = diff_watch_list(active, wanted, &self.pinned);
        for address in diff.removed {
            info!(address = %address, "Unsubscribing removed watch address");
            if let Err(e) = self.feed.unsubscribe(address).await {
                error!(address = %address, error = %e, "Failed to unsubscribe");
                continue;
            }
            active.remove(&address);
        }
        for address in diff.added {
            info!(address = %address, "Subscribing new watch address");
            if let Err(e) = self.feed.subscribe_to_address(address).await {
                error!(address = %address, error = %e, "Failed to subscribe");
                continue;
            }
            active.insert(address);
        }
    }
}
