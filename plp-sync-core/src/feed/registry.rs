//! Subscription bookkeeping for the feed connection.
//!
//! Invariants:
//! - `handles` holds every target the caller wants watched, in a stable
//!   order, whether or not the feed has confirmed it yet.
//! - `by_subscription[id] == target` exactly when
//!   `handles[target] == Some(id)`.
//! - `pending` maps in-flight request ids to the request they carry; it is
//!   emptied on reconnect together with `by_subscription`.
//! - Notifications for an id not in `by_subscription` are buffered under
//!   that id, in arrival order, until a confirmation claims it or the
//!   buffer expires.
//!
//! The registry does no I/O: it returns the request texts the caller must
//! send and the notifications the caller must handle.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::time::{Duration, Instant};

use super::rpc::{
    AccountNotification, RpcError, SubscriptionTarget, subscribe_request, unsubscribe_request,
};
use crate::accounts::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest {
    Subscribe(SubscriptionTarget),
    Unsubscribe(SubscriptionTarget),
}

struct NotificationBuffer {
    first_seen: Instant,
    items: Vec<AccountNotification>,
}

/// Outcome of a response to one of our requests.
#[derive(Debug, PartialEq)]
pub enum ResponseOutcome {
    /// A subscription was confirmed; `ready` holds notifications that
    /// arrived before the confirmation, in arrival order.
    Confirmed {
        target: SubscriptionTarget,
        subscription_id: u64,
        ready: Vec<(Address, AccountNotification)>,
    },
    /// The target was dropped while its subscribe was in flight; the
    /// returned unsubscribe must be sent.
    Orphaned { unsubscribe: String },
    Rejected {
        target: SubscriptionTarget,
        error: RpcError,
    },
    Unsubscribed { target: SubscriptionTarget },
    /// Response to a request from before the last reconnect, or garbage.
    Unknown,
}

/// Where a notification went.
#[derive(Debug, PartialEq)]
pub enum Routed {
    Ready(Address, AccountNotification),
    Buffered,
    /// Program notification without a pubkey; nothing to attribute it to.
    Unattributable,
}

/// Buffer dropped because its confirmation never arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredBuffer {
    pub subscription_id: u64,
    pub dropped: usize,
}

pub struct SubscriptionRegistry {
    commitment: String,
    next_request_id: u64,
    handles: BTreeMap<SubscriptionTarget, Option<u64>>,
    by_subscription: HashMap<u64, SubscriptionTarget>,
    pending: HashMap<u64, PendingRequest>,
    buffers: HashMap<u64, NotificationBuffer>,
}

impl SubscriptionRegistry {
    pub fn new(commitment: impl Into<String>) -> Self {
        Self {
            commitment: commitment.into(),
            next_request_id: 1,
            handles: BTreeMap::new(),
            by_subscription: HashMap::new(),
            pending: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    fn allocate_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Number of targets being watched, confirmed or not.
    pub fn subscription_count(&self) -> usize {
        self.handles.len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.by_subscription.len()
    }

    pub fn contains(&self, target: &SubscriptionTarget) -> bool {
        self.handles.contains_key(target)
    }

    /// Register a target. Returns the subscribe request to send, or `None`
    /// if the target is already registered.
    pub fn subscribe(&mut self, target: SubscriptionTarget) -> Option<String> {
        if self.handles.contains_key(&target) {
            return None;
        }
        self.handles.insert(target, None);
        let request_id = self.allocate_request_id();
        self.pending
            .insert(request_id, PendingRequest::Subscribe(target));
        Some(subscribe_request(request_id, &target, &self.commitment))
    }

    /// Drop a target. Returns the unsubscribe request to send when the
    /// target had a confirmed subscription.
    pub fn unsubscribe(&mut self, target: &SubscriptionTarget) -> Option<String> {
        let subscription_id = self.handles.remove(target)??;
        self.by_subscription.remove(&subscription_id);
        self.buffers.remove(&subscription_id);
        let request_id = self.allocate_request_id();
        self.pending
            .insert(request_id, PendingRequest::Unsubscribe(*target));
        Some(unsubscribe_request(request_id, target, subscription_id))
    }

    pub fn handle_response(
        &mut self,
        request_id: u64,
        result: Result<Value, RpcError>,
    ) -> ResponseOutcome {
        let Some(request) = self.pending.remove(&request_id) else {
            return ResponseOutcome::Unknown;
        };
        match (request, result) {
            (PendingRequest::Subscribe(target), Ok(value)) => {
                let Some(subscription_id) = value.as_u64() else {
                    return ResponseOutcome::Unknown;
                };
                match self.handles.get_mut(&target) {
                    Some(slot) => {
                        *slot = Some(subscription_id);
                        self.by_subscription.insert(subscription_id, target);
                        let ready = self
                            .buffers
                            .remove(&subscription_id)
                            .map(|buffer| buffer.items)
                            .unwrap_or_default()
                            .into_iter()
                            .filter_map(|n| attribute(&target, n))
                            .collect();
                        ResponseOutcome::Confirmed {
                            target,
                            subscription_id,
                            ready,
                        }
                    }
                    None => {
                        self.buffers.remove(&subscription_id);
                        let request_id = self.allocate_request_id();
                        self.pending
                            .insert(request_id, PendingRequest::Unsubscribe(target));
                        ResponseOutcome::Orphaned {
                            unsubscribe: unsubscribe_request(request_id, &target, subscription_id),
                        }
                    }
                }
            }
            (PendingRequest::Subscribe(target), Err(error)) => {
                self.handles.remove(&target);
                ResponseOutcome::Rejected { target, error }
            }
            (PendingRequest::Unsubscribe(target), _) => ResponseOutcome::Unsubscribed { target },
        }
    }

    pub fn route_notification(&mut self, notification: AccountNotification, now: Instant) -> Routed {
        match self.by_subscription.get(&notification.subscription_id) {
            Some(target) => match attribute(target, notification) {
                Some((address, n)) => Routed::Ready(address, n),
                None => Routed::Unattributable,
            },
            None => {
                self.buffers
                    .entry(notification.subscription_id)
                    .or_insert_with(|| NotificationBuffer {
                        first_seen: now,
                        items: Vec::new(),
                    })
                    .items
                    .push(notification);
                Routed::Buffered
            }
        }
    }

    /// Drop buffers older than `window`.
    pub fn expire_buffers(&mut self, now: Instant, window: Duration) -> Vec<ExpiredBuffer> {
        let mut expired = Vec::new();
        self.buffers.retain(|subscription_id, buffer| {
            let keep = now.duration_since(buffer.first_seen) < window;
            if !keep {
                expired.push(ExpiredBuffer {
                    subscription_id: *subscription_id,
                    dropped: buffer.items.len(),
                });
            }
            keep
        });
        expired
    }

    pub fn buffered_count(&self) -> usize {
        self.buffers.values().map(|b| b.items.len()).sum()
    }

    /// Forget every upstream id and produce a fresh subscribe request for
    /// each registered target, in registration order.
    pub fn reset_for_reconnect(&mut self) -> Vec<String> {
        self.by_subscription.clear();
        self.pending.clear();
        self.buffers.clear();
        let targets: Vec<SubscriptionTarget> = self.handles.keys().copied().collect();
        targets
            .into_iter()
            .map(|target| {
                self.handles.insert(target, None);
                let request_id = self.allocate_request_id();
                self.pending
                    .insert(request_id, PendingRequest::Subscribe(target));
                subscribe_request(request_id, &target, &self.commitment)
            })
            .collect()
    }
}

fn attribute(
    target: &SubscriptionTarget,
    notification: AccountNotification,
) -> Option<(Address, AccountNotification)> {
    match target {
        SubscriptionTarget::Account(address) => Some((*address, notification)),
        SubscriptionTarget::Program(_) => notification.pubkey.map(|pk| (pk, notification)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(byte: u8) -> SubscriptionTarget {
        SubscriptionTarget::Account(Address::new([byte; 32]))
    }

    fn request_id(request: &str) -> u64 {
        serde_json::from_str::<Value>(request).unwrap()["id"]
            .as_u64()
            .unwrap()
    }

    fn notification(subscription_id: u64, slot: u64) -> AccountNotification {
        AccountNotification {
            subscription_id,
            slot,
            pubkey: None,
            data: vec![slot as u8],
        }
    }

    #[test]
    fn notifications_before_confirmation_drain_in_order() {
        let now = Instant::now();
        let mut registry = SubscriptionRegistry::new("confirmed");
        let target = account(1);
        let request = registry.subscribe(target).unwrap();

        assert_eq!(registry.route_notification(notification(42, 10), now), Routed::Buffered);
        assert_eq!(registry.route_notification(notification(42, 11), now), Routed::Buffered);
        assert_eq!(registry.buffered_count(), 2);

        let outcome = registry.handle_response(request_id(&request), Ok(json!(42)));
        let ResponseOutcome::Confirmed { ready, subscription_id, .. } = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(subscription_id, 42);
        let slots: Vec<u64> = ready.iter().map(|(_, n)| n.slot).collect();
        assert_eq!(slots, vec![10, 11]);
        assert!(ready.iter().all(|(a, _)| a == target.address()));
        assert_eq!(registry.buffered_count(), 0);

        assert!(matches!(
            registry.route_notification(notification(42, 12), now),
            Routed::Ready(_, n) if n.slot == 12
        ));
    }

    #[test]
    fn reconnect_resends_every_subscription_and_forgets_ids() {
        let now = Instant::now();
        let mut registry = SubscriptionRegistry::new("confirmed");
        for byte in 1..=5u8 {
            let request = registry.subscribe(account(byte)).unwrap();
            registry.handle_response(request_id(&request), Ok(json!(100 + u64::from(byte))));
        }
        assert_eq!(registry.confirmed_count(), 5);

        let requests = registry.reset_for_reconnect();
        assert_eq!(requests.len(), 5);
        assert_eq!(registry.confirmed_count(), 0);
        assert_eq!(registry.subscription_count(), 5);

        // an old id is no longer routable before new confirmations land
        assert_eq!(registry.route_notification(notification(101, 1), now), Routed::Buffered);

        for (i, request) in requests.iter().enumerate() {
            let outcome = registry.handle_response(request_id(request), Ok(json!(200 + i as u64)));
            assert!(matches!(outcome, ResponseOutcome::Confirmed { .. }));
        }
        assert_eq!(registry.confirmed_count(), 5);
    }

    #[test]
    fn stale_responses_after_reconnect_are_unknown() {
        let mut registry = SubscriptionRegistry::new("confirmed");
        let request = registry.subscribe(account(1)).unwrap();
        registry.reset_for_reconnect();
        assert_eq!(
            registry.handle_response(request_id(&request), Ok(json!(5))),
            ResponseOutcome::Unknown
        );
    }

    #[test]
    fn unconfirmed_buffers_expire() {
        let start = Instant::now();
        let mut registry = SubscriptionRegistry::new("confirmed");
        registry.route_notification(notification(9, 1), start);
        registry.route_notification(notification(9, 2), start);

        let window = Duration::from_secs(30);
        assert!(registry.expire_buffers(start + Duration::from_secs(29), window).is_empty());
        assert_eq!(
            registry.expire_buffers(start + Duration::from_secs(30), window),
            vec![ExpiredBuffer {
                subscription_id: 9,
                dropped: 2
            }]
        );
        assert_eq!(registry.buffered_count(), 0);
    }

    #[test]
    fn unsubscribe_confirmed_and_pending_targets() {
        let mut registry = SubscriptionRegistry::new("confirmed");
        let confirmed = account(1);
        let request = registry.subscribe(confirmed).unwrap();
        registry.handle_response(request_id(&request), Ok(json!(7)));
        let unsubscribe = registry.unsubscribe(&confirmed).unwrap();
        assert!(unsubscribe.contains("accountUnsubscribe"));
        assert_eq!(
            registry.handle_response(request_id(&unsubscribe), Ok(json!(true))),
            ResponseOutcome::Unsubscribed { target: confirmed }
        );

        let pending = account(2);
        let request = registry.subscribe(pending).unwrap();
        assert!(registry.unsubscribe(&pending).is_none());
        assert!(matches!(
            registry.handle_response(request_id(&request), Ok(json!(8))),
            ResponseOutcome::Orphaned { .. }
        ));
        assert_eq!(registry.subscription_count(), 0);
    }

    #[test]
    fn duplicate_subscribe_is_a_no_op() {
        let mut registry = SubscriptionRegistry::new("confirmed");
        assert!(registry.subscribe(account(1)).is_some());
        assert!(registry.subscribe(account(1)).is_none());
        assert_eq!(registry.subscription_count(), 1);
    }

    #[test]
    fn rejected_subscription_is_dropped() {
        let mut registry = SubscriptionRegistry::new("confirmed");
        let request = registry.subscribe(account(1)).unwrap();
        let outcome = registry.handle_response(
            request_id(&request),
            Err(RpcError {
                code: -32602,
                message: "Invalid param".into(),
            }),
        );
        assert!(matches!(outcome, ResponseOutcome::Rejected { .. }));
        assert_eq!(registry.subscription_count(), 0);
    }
}
