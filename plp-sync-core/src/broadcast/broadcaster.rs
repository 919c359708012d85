use plp_sync_sdk::objects::{
    BroadcastMessage, MarketResolvedPayload, MarketUpdatePayload, PositionUpdatePayload, Topic,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

use super::redact::redact;
use super::{BroadcastSink, Envelope};
use crate::accounts::Address;
use crate::config::BroadcastConfig;

/// Throttle state is pruned once this many addresses are tracked.
const PRUNE_THRESHOLD: usize = 4096;

/// Rate-limited, coalescing front of a [`BroadcastSink`].
///
/// Per address, at most one message is emitted immediately per
/// `min_interval`. Messages arriving inside the interval replace each other
/// and the latest one is flushed once, after
/// `max(coalesce_delay, remaining interval)`.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn BroadcastSink>,
    config: BroadcastConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

struct Slot {
    last_emit: Instant,
    pending: Option<Envelope>,
    flush_scheduled: bool,
}

impl Broadcaster {
    pub fn new(sink: Arc<dyn BroadcastSink>, config: BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn broadcast_market_update(&self, address: &Address, payload: MarketUpdatePayload) {
        let envelope = Envelope {
            topics: vec![Topic::Market(address.to_string()), Topic::All],
            message: BroadcastMessage::MarketUpdate(payload),
        };
        self.inner.submit(address.to_string(), envelope);
    }

    /// Throttled per position account; delivered to the owner, the market
    /// and the catch-all topic.
    pub fn broadcast_position_update(
        &self,
        owner: &Address,
        address: &Address,
        payload: PositionUpdatePayload,
    ) {
        let envelope = Envelope {
            topics: vec![
                Topic::User(owner.to_string()),
                Topic::Market(payload.market_address.clone()),
                Topic::All,
            ],
            message: BroadcastMessage::PositionUpdate(payload),
        };
        self.inner.submit(address.to_string(), envelope);
    }

    /// Resolution notices are rare and never coalesced.
    pub fn broadcast_market_resolved(&self, payload: MarketResolvedPayload) {
        let envelope = Envelope {
            topics: vec![Topic::Market(payload.market_address.clone()), Topic::All],
            message: BroadcastMessage::MarketResolved(payload),
        };
        self.inner.emit(envelope);
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, key: String, envelope: Envelope) {
        let now = Instant::now();
        let min_interval = self.config.min_interval;
        let Ok(mut slots) = self.slots.lock() else {
            error!("Broadcast throttle state poisoned, emitting unthrottled");
            self.emit(envelope);
            return;
        };

        if slots.len() > PRUNE_THRESHOLD {
            slots.retain(|_, slot| {
                slot.flush_scheduled || now.duration_since(slot.last_emit) < min_interval
            });
        }

        match slots.get_mut(&key) {
            Some(slot) if slot.flush_scheduled => {
                debug!(address = %key, "Coalescing broadcast into pending flush");
                slot.pending = Some(envelope);
                return;
            }
            Some(slot) if now.duration_since(slot.last_emit) < min_interval => {
                let remaining = min_interval - now.duration_since(slot.last_emit);
                let delay = remaining.max(self.config.coalesce_delay);
                debug!(address = %key, delay_ms = delay.as_millis() as u64, "Deferring broadcast");
                slot.pending = Some(envelope);
                slot.flush_scheduled = true;
                self.schedule_flush(key, delay);
                return;
            }
            Some(slot) => slot.last_emit = now,
            None => {
                slots.insert(
                    key,
                    Slot {
                        last_emit: now,
                        pending: None,
                        flush_scheduled: false,
                    },
                );
            }
        }
        drop(slots);
        self.emit(envelope);
    }

    fn schedule_flush(self: &Arc<Self>, key: String, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush(&key);
        });
    }

    fn flush(&self, key: &str) {
        let pending = match self.slots.lock() {
            Ok(mut slots) => slots.get_mut(key).and_then(|slot| {
                slot.flush_scheduled = false;
                slot.last_emit = Instant::now();
                slot.pending.take()
            }),
            Err(_) => {
                error!(address = %key, "Broadcast throttle state poisoned, dropping flush");
                None
            }
        };
        if let Some(envelope) = pending {
            self.emit(envelope);
        }
    }

    fn emit(&self, envelope: Envelope) {
        let envelope = Envelope {
            topics: envelope.topics,
            message: redact(envelope.message),
        };
        self.sink.publish(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::redact::fixtures::{market_payload, position_payload};
    use crate::broadcast::testing::RecordingSink;
    use plp_sync_sdk::objects::Resolution;

    fn broadcaster() -> (Broadcaster, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let broadcaster = Broadcaster::new(sink.clone(), BroadcastConfig::default());
        (broadcaster, sink)
    }

    fn slot_of(envelope: &Envelope) -> u64 {
        match &envelope.message {
            BroadcastMessage::MarketUpdate(p) => p.slot,
            BroadcastMessage::PositionUpdate(p) => p.slot,
            BroadcastMessage::MarketResolved(p) => p.slot,
        }
    }

    fn at_slot(slot: u64) -> MarketUpdatePayload {
        let mut payload = market_payload(Resolution::YesWins);
        payload.slot = slot;
        payload
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_are_coalesced_to_latest_payload() {
        let (broadcaster, sink) = broadcaster();
        let address = Address::new([7; 32]);

        broadcaster.broadcast_market_update(&address, at_slot(1));
        assert_eq!(sink.published().len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        broadcaster.broadcast_market_update(&address, at_slot(2));
        tokio::time::sleep(Duration::from_millis(10)).await;
        broadcaster.broadcast_market_update(&address, at_slot(3));
        assert_eq!(sink.published().len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let published = sink.published();
        assert_eq!(published.iter().map(slot_of).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_the_minimum_interval() {
        let (broadcaster, sink) = broadcaster();
        let address = Address::new([7; 32]);

        broadcaster.broadcast_market_update(&address, at_slot(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        broadcaster.broadcast_market_update(&address, at_slot(2));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sink.published().len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.published().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn addresses_are_throttled_independently() {
        let (broadcaster, sink) = broadcaster();
        broadcaster.broadcast_market_update(&Address::new([1; 32]), at_slot(1));
        broadcaster.broadcast_market_update(&Address::new([2; 32]), at_slot(1));
        assert_eq!(sink.published().len(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        broadcaster.broadcast_market_update(&Address::new([1; 32]), at_slot(2));
        assert_eq!(sink.published().len(), 3);
    }

    #[tokio::test]
    async fn emitted_market_update_is_redacted_while_unresolved() {
        let (broadcaster, sink) = broadcaster();
        let address = Address::new([7; 32]);
        broadcaster.broadcast_market_update(&address, market_payload(Resolution::Unresolved));

        let published = sink.published();
        assert_eq!(
            published[0].topics,
            vec![Topic::Market(address.to_string()), Topic::All]
        );
        let value = serde_json::to_value(&published[0].message).unwrap();
        assert!(value["data"]["yes_percentage"].is_null());
        assert!(value["data"]["yes_vote_count"].is_null());
        assert!(value["data"]["total_no_staked"].is_null());
    }

    #[tokio::test]
    async fn position_update_reaches_owner_market_and_all() {
        let (broadcaster, sink) = broadcaster();
        let owner = Address::new([3; 32]);
        broadcaster.broadcast_position_update(
            &owner,
            &Address::new([5; 32]),
            position_payload(Resolution::Unresolved),
        );

        let published = sink.published();
        assert_eq!(
            published[0].topics,
            vec![
                Topic::User(owner.to_string()),
                Topic::Market("Mkt".into()),
                Topic::All
            ]
        );
        let BroadcastMessage::PositionUpdate(payload) = &published[0].message else {
            panic!("expected a position update");
        };
        assert_eq!(payload.side, None);
    }
}
