//! Fan-out of reconciled state to stream consumers.
//!
//! [`Broadcaster`] is what the event processor talks to: it throttles per
//! address, coalesces bursts and redacts vote-revealing fields before
//! anything reaches a [`BroadcastSink`]. [`BroadcastHub`] is the in-process
//! sink the HTTP stream endpoint subscribes to.

pub mod broadcaster;
pub mod redact;

pub use broadcaster::Broadcaster;

use plp_sync_sdk::objects::{BroadcastMessage, Topic};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// A message and the topics it is published on, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub topics: Vec<Topic>,
    pub message: BroadcastMessage,
}

impl Envelope {
    /// The topic a consumer holding `subscribed` should see this message
    /// under, if any. A consumer receives each envelope at most once.
    pub fn matching_topic(&self, subscribed: &HashSet<Topic>) -> Option<&Topic> {
        self.topics.iter().find(|topic| subscribed.contains(*topic))
    }
}

pub trait BroadcastSink: Send + Sync {
    fn publish(&self, envelope: Envelope);
}

/// Publish/subscribe hub over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    pub fn consumer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl BroadcastSink for BroadcastHub {
    fn publish(&self, envelope: Envelope) {
        if self.sender.send(Arc::new(envelope)).is_err() {
            debug!("No stream consumers connected, dropping broadcast");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use plp_sync_sdk::objects::{MarketResolvedPayload, Resolution};

    fn envelope() -> Envelope {
        Envelope {
            topics: vec![Topic::Market("M".into()), Topic::All],
            message: BroadcastMessage::MarketResolved(MarketResolvedPayload {
                market_address: "M".into(),
                resolution: Resolution::NoWins,
                slot: 3,
            }),
        }
    }

    #[test]
    fn consumer_sees_most_specific_topic_once() {
        let subscribed: HashSet<Topic> = [Topic::All, Topic::Market("M".into())].into();
        assert_eq!(
            envelope().matching_topic(&subscribed),
            Some(&Topic::Market("M".into()))
        );

        let unrelated: HashSet<Topic> = [Topic::User("U".into())].into();
        assert_eq!(envelope().matching_topic(&unrelated), None);
    }

    #[tokio::test]
    async fn hub_delivers_to_every_subscriber() {
        let hub = BroadcastHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.consumer_count(), 2);

        hub.publish(envelope());
        assert_eq!(*first.recv().await.unwrap(), envelope());
        assert_eq!(*second.recv().await.unwrap(), envelope());
    }
}
