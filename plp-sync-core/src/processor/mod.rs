//! Worker loop: dequeue, decode, reconcile, persist, broadcast, ack.
//!
//! Any failure while handling an event is recorded on the event through
//! [`EventQueue::fail`]; the loop itself never stops on an event error.
//! Several workers may run against the same queue. Reconciliation always
//! writes full decoded state and is guarded by slot, so the order in which
//! workers finish does not matter.

pub mod reconcile;

pub use reconcile::Reconciler;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::accounts::{AccountClass, Address, DecodeError, DecodedAccount, classify, decode_account};
use crate::config::ProcessorConfig;
use crate::events::{EventKind, EventPayload, QueuedEvent};
use crate::feed::{AccountFetcher, FetchError};
use crate::queue::{EventQueue, FailOutcome};
use crate::store::StoreError;

/// Pause after a queue store error before popping again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("read model error: {0}")]
    Store(#[from] StoreError),

    #[error("account fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("market {0} is not resolved on the ledger yet")]
    NotYetResolved(Address),

    #[error("account {0} is not a market")]
    NotAMarket(Address),
}

/// Why an event was acknowledged without writing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No read-model row exists for the market.
    MissingRow,
    /// The read model already holds a newer slot.
    StaleSlot,
    /// The account bytes match neither known layout.
    Unrecognized,
    /// The fetched account does not exist on the ledger.
    AccountMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
}

/// Number of worker loops currently running.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStatus {
    running: Arc<AtomicUsize>,
}

impl ProcessorStatus {
    pub fn is_running(&self) -> bool {
        self.running_workers() > 0
    }

    pub fn running_workers(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct EventProcessor {
    queue: Arc<dyn EventQueue>,
    fetcher: Arc<dyn AccountFetcher>,
    reconciler: Arc<Reconciler>,
    config: ProcessorConfig,
    status: ProcessorStatus,
}

impl EventProcessor {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        fetcher: Arc<dyn AccountFetcher>,
        reconciler: Arc<Reconciler>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            fetcher,
            reconciler,
            config,
            status: ProcessorStatus::default(),
        }
    }

    /// Shared across clones, so one status covers every worker.
    pub fn status(&self) -> ProcessorStatus {
        self.status.clone()
    }

    /// Run one worker until shutdown is signaled.
    ///
    /// The stop flag is checked between events only; `pop` returns within
    /// `pop_timeout` when idle, so shutdown is observed without cancelling
    /// an event mid-flight.
    pub async fn run(self, worker: usize, shutdown_rx: watch::Receiver<bool>) {
        let _running = RunningGuard::enter(&self.status.running);
        info!(worker, "EventProcessor started");

        while !*shutdown_rx.borrow() {
            match self.queue.pop(self.config.pop_timeout).await {
                Ok(Some(event)) => self.handle(event).await,
                Ok(None) => {}
                Err(e) => {
                    error!(worker, error = %e, "Failed to pop from event queue");
                    tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                }
            }
        }

        info!(worker, "EventProcessor shutdown complete");
    }

    /// Process one popped event and settle it with the queue.
    pub async fn handle(&self, event: QueuedEvent) {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        match self.process(&event, now).await {
            Ok(outcome) => {
                match outcome {
                    Outcome::Applied => {}
                    Outcome::Skipped(reason) => debug!(
                        event_id = %event.id,
                        address = %event.address,
                        ?reason,
                        "Event skipped"
                    ),
                }
                if let Err(e) = self.queue.ack(event.id).await {
                    error!(event_id = %event.id, error = %e, "Failed to ack event");
                }
            }
            Err(e) => self.fail(event, &e).await,
        }
    }

    async fn fail(&self, event: QueuedEvent, error: &ProcessError) {
        let reason = error.to_string();
        let id = event.id;
        let address = event.address;
        let is_market = event.account_class == AccountClass::Market;
        warn!(event_id = %id, address = %address, error = %reason, "Event processing failed");

        match self.queue.fail(event, &reason).await {
            Ok(FailOutcome::Requeued { retry_count }) => {
                debug!(event_id = %id, retry_count, "Event requeued for retry");
            }
            Ok(FailOutcome::DeadLettered) => {
                error!(event_id = %id, address = %address, "Event moved to dead-letter queue");
                if is_market {
                    if let Err(e) = self.reconciler.store().mark_sync_failed(&address).await {
                        warn!(address = %address, error = %e, "Failed to mark market sync failed");
                    }
                }
            }
            Err(e) => error!(event_id = %id, error = %e, "Failed to record event failure"),
        }
    }

    pub async fn process(&self, event: &QueuedEvent, now: i64) -> Result<Outcome, ProcessError> {
        let (slot, data) = match &event.payload {
            EventPayload::AccountUpdate { data } => (event.slot, data.clone()),
            EventPayload::Resync | EventPayload::MarketResolved => {
                match self.fetcher.fetch_account(&event.address).await? {
                    Some(fetched) => (fetched.slot, fetched.data),
                    None => return Ok(Outcome::Skipped(SkipReason::AccountMissing)),
                }
            }
        };

        let Some(decoded) = decode_account(classify(&data), &data)? else {
            debug!(address = %event.address, len = data.len(), "Unrecognized account layout");
            return Ok(Outcome::Skipped(SkipReason::Unrecognized));
        };

        match decoded {
            DecodedAccount::Market(market) => {
                if event.kind() == EventKind::MarketResolved && !market.resolution.is_resolved() {
                    return Err(ProcessError::NotYetResolved(event.address));
                }
                self.reconciler
                    .reconcile_market(&event.address, slot, &market, now)
                    .await
            }
            DecodedAccount::Position(position) => {
                if event.kind() == EventKind::MarketResolved {
                    return Err(ProcessError::NotAMarket(event.address));
                }
                self.reconciler
                    .reconcile_position(&event.address, slot, &position, now)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::fixtures;
    use crate::broadcast::testing::RecordingSink;
    use crate::broadcast::{Broadcaster, Envelope};
    use crate::config::{BroadcastConfig, QueueConfig};
    use crate::entities::{MarketRecord, SyncState, utc_now};
    use crate::feed::FetchedAccount;
    use crate::queue::MemoryEventQueue;
    use crate::store::{MemoryReadModelStore, ReadModelStore};
    use async_trait::async_trait;
    use plp_sync_sdk::objects::{BroadcastMessage, Resolution};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const NOW: i64 = 1_800_000_000;

    #[derive(Default)]
    struct FakeFetcher {
        accounts: Mutex<HashMap<Address, FetchedAccount>>,
    }

    impl FakeFetcher {
        fn set(&self, address: Address, slot: u64, data: Vec<u8>) {
            self.accounts
                .lock()
                .unwrap()
                .insert(address, FetchedAccount { slot, data });
        }
    }

    #[async_trait]
    impl AccountFetcher for FakeFetcher {
        async fn fetch_account(
            &self,
            address: &Address,
        ) -> Result<Option<FetchedAccount>, FetchError> {
            Ok(self.accounts.lock().unwrap().get(address).cloned())
        }
    }

    struct Harness {
        processor: EventProcessor,
        queue: Arc<MemoryEventQueue>,
        store: Arc<MemoryReadModelStore>,
        fetcher: Arc<FakeFetcher>,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        async fn new() -> Self {
            let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
            let store = Arc::new(MemoryReadModelStore::new());
            let fetcher = Arc::new(FakeFetcher::default());
            let sink = Arc::new(RecordingSink::default());
            store
                .insert_market(MarketRecord::registered(market_address().to_string(), utc_now()))
                .await;
            let broadcaster = Broadcaster::new(sink.clone(), BroadcastConfig::default());
            let reconciler = Arc::new(Reconciler::new(store.clone(), broadcaster));
            let processor = EventProcessor::new(
                queue.clone(),
                fetcher.clone(),
                reconciler,
                ProcessorConfig {
                    workers: 1,
                    pop_timeout: Duration::from_millis(50),
                },
            );
            Self {
                processor,
                queue,
                store,
                fetcher,
                sink,
            }
        }

        async fn run_one(&self, event: QueuedEvent) {
            self.queue.push(event).await.unwrap();
            let popped = self.queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
            self.processor.handle(popped).await;
        }

        fn messages(&self) -> Vec<BroadcastMessage> {
            self.sink
                .published()
                .into_iter()
                .map(|Envelope { message, .. }| message)
                .collect()
        }
    }

    fn market_address() -> Address {
        fixtures::address(2)
    }

    fn market_event(slot: u64) -> QueuedEvent {
        QueuedEvent::account_update(market_address(), slot, fixtures::market().encode())
    }

    fn position_event(slot: u64) -> QueuedEvent {
        QueuedEvent::account_update(fixtures::address(5), slot, fixtures::position().encode())
    }

    #[tokio::test]
    async fn market_update_is_persisted_snapshotted_and_broadcast() {
        let h = Harness::new().await;
        h.run_one(market_event(10)).await;

        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!(row.last_slot, 10);
        assert_eq!(row.sync_count, 1);
        assert_eq!(row.yes_percentage, 70);
        assert_eq!(h.store.snapshots().await.len(), 1);
        assert_eq!(h.queue.stats().await.unwrap().processing_count, 0);

        let messages = h.messages();
        assert_eq!(messages.len(), 1);
        let BroadcastMessage::MarketUpdate(payload) = &messages[0] else {
            panic!("expected a market update");
        };
        assert_eq!(payload.slot, 10);
        assert_eq!(payload.yes_percentage, None);
        assert_eq!(payload.pool_progress_percentage, 40);
    }

    #[tokio::test]
    async fn unregistered_market_is_skipped_and_acked() {
        let h = Harness::new().await;
        let event =
            QueuedEvent::account_update(fixtures::address(8), 1, fixtures::market().encode());
        assert_eq!(
            h.processor.process(&event, NOW).await.unwrap(),
            Outcome::Skipped(SkipReason::MissingRow)
        );

        h.run_one(event).await;
        let stats = h.queue.stats().await.unwrap();
        assert_eq!((stats.processing_count, stats.dlq_length), (0, 0));
        assert!(h.messages().is_empty());
    }

    #[tokio::test]
    async fn older_slot_does_not_overwrite() {
        let h = Harness::new().await;
        h.run_one(market_event(10)).await;
        assert_eq!(
            h.processor.process(&market_event(9), NOW).await.unwrap(),
            Outcome::Skipped(SkipReason::StaleSlot)
        );
        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!((row.last_slot, row.sync_count), (10, 1));
    }

    #[tokio::test]
    async fn unknown_account_is_skipped() {
        let h = Harness::new().await;
        let event = QueuedEvent::account_update(fixtures::address(6), 1, vec![0; 40]);
        assert_eq!(
            h.processor.process(&event, NOW).await.unwrap(),
            Outcome::Skipped(SkipReason::Unrecognized)
        );
    }

    #[tokio::test]
    async fn position_insert_counts_vote_and_broadcasts_to_owner() {
        let h = Harness::new().await;
        h.run_one(position_event(4)).await;
        h.run_one(position_event(5)).await;

        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!(row.yes_vote_count, 1);
        let participant = h
            .store
            .participant(&market_address(), &fixtures::address(3))
            .await
            .unwrap();
        assert_eq!(participant.last_slot, 5);

        let messages = h.messages();
        let BroadcastMessage::PositionUpdate(payload) = &messages[0] else {
            panic!("expected a position update");
        };
        assert_eq!(payload.owner, fixtures::address(3).to_string());
        assert_eq!(payload.side, None);
    }

    #[tokio::test]
    async fn resolution_transition_emits_resolved_message() {
        let h = Harness::new().await;
        h.run_one(market_event(10)).await;

        let mut resolved = fixtures::market();
        resolved.resolution = Resolution::YesWins;
        h.run_one(QueuedEvent::account_update(market_address(), 11, resolved.encode()))
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let messages = h.messages();
        assert!(messages.iter().any(|m| matches!(
            m,
            BroadcastMessage::MarketResolved(p) if p.resolution == Resolution::YesWins
        )));
        let Some(BroadcastMessage::MarketUpdate(last)) = messages
            .iter()
            .rev()
            .find(|m| matches!(m, BroadcastMessage::MarketUpdate(_)))
        else {
            panic!("expected a market update");
        };
        assert_eq!(last.yes_percentage, Some(70));
    }

    #[tokio::test]
    async fn resolved_notice_retries_until_ledger_shows_resolution() {
        let h = Harness::new().await;
        h.fetcher.set(market_address(), 20, fixtures::market().encode());

        let event = QueuedEvent::market_resolved(market_address());
        assert!(matches!(
            h.processor.process(&event, NOW).await,
            Err(ProcessError::NotYetResolved(_))
        ));

        let mut resolved = fixtures::market();
        resolved.resolution = Resolution::NoWins;
        h.fetcher.set(market_address(), 21, resolved.encode());
        assert_eq!(h.processor.process(&event, NOW).await.unwrap(), Outcome::Applied);
        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!(row.last_slot, 21);
    }

    #[tokio::test]
    async fn snapshot_failure_does_not_fail_event() {
        let h = Harness::new().await;
        h.store.set_fail_snapshots(true);
        h.run_one(market_event(10)).await;

        assert_eq!(h.store.snapshots().await.len(), 0);
        let stats = h.queue.stats().await.unwrap();
        assert_eq!((stats.queue_length, stats.dlq_length), (0, 0));
        assert_eq!(
            h.store.market(&market_address()).await.unwrap().unwrap().sync_count,
            1
        );
    }

    #[tokio::test]
    async fn store_outage_retries_then_dead_letters_and_marks_row() {
        let h = Harness::new().await;
        h.store.set_fail_writes(true);
        h.queue.push(market_event(10)).await.unwrap();

        for _ in 0..3 {
            let event = h.queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
            h.processor.handle(event).await;
        }

        let stats = h.queue.stats().await.unwrap();
        assert_eq!((stats.queue_length, stats.dlq_length), (0, 1));
        let (dead, _) = h.queue.dead_letters(10).await.unwrap();
        assert_eq!(dead[0].retry_count, 3);
        assert!(dead[0].last_error.as_deref().unwrap().contains("unavailable"));
        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!(row.sync_status, SyncState::Failed);
    }

    #[tokio::test]
    async fn malformed_market_bytes_fail_instead_of_panicking() {
        let h = Harness::new().await;
        let market = fixtures::market();
        let phase_at = 8 + 32 + 4 + market.ipfs_cid.len() + 7 * 8 + 8;
        let mut data = market.encode();
        data[phase_at] = 7;
        let event = QueuedEvent::account_update(market_address(), 3, data);
        assert!(matches!(
            h.processor.process(&event, NOW).await,
            Err(ProcessError::Decode(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn worker_stops_between_events_on_shutdown() {
        let h = Harness::new().await;
        let status = h.processor.status();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(h.processor.clone().run(0, shutdown_rx));

        h.queue.push(market_event(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(status.is_running());

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
        assert!(!status.is_running());
        let row = h.store.market(&market_address()).await.unwrap().unwrap();
        assert_eq!(row.sync_count, 1);
    }
}
