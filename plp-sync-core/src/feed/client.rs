//! Connection task for the ledger feed.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use plp_sync_sdk::objects::FeedState;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use super::FeedError;
use super::backoff::Backoff;
use super::registry::{ResponseOutcome, Routed, SubscriptionRegistry};
use super::rpc::{AccountNotification, FeedMessage, SubscriptionTarget, parse_message};
use crate::accounts::Address;
use crate::config::FeedConfig;
use crate::events::QueuedEvent;
use crate::queue::EventQueue;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const COMMAND_BUFFER: usize = 256;
/// Notifications held locally while the queue store is unreachable.
/// Past this the session is dropped so nothing more is read off the socket.
const PENDING_LIMIT: usize = 1024;
const PUSH_RETRY_BASE: Duration = Duration::from_millis(50);
const PUSH_RETRY_MAX: Duration = Duration::from_secs(1);
const PUSH_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStatus {
    pub state: FeedState,
    pub subscription_count: usize,
    pub reconnect_attempts: u32,
}

enum Command {
    Connect,
    Subscribe(SubscriptionTarget),
    Unsubscribe(SubscriptionTarget),
    Disconnect,
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    /// Caller asked to disconnect; no reconnect.
    Disconnect,
    /// Transport went away on its own; reconnect with backoff.
    Dropped(String),
}

/// Control surface of a running [`SubscriptionClient`].
#[derive(Clone)]
pub struct FeedHandle {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<FeedStatus>,
}

impl FeedHandle {
    async fn send(&self, command: Command) -> Result<(), FeedError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| FeedError::Closed)
    }

    /// Open the connection (and keep reopening it after unexpected drops).
    pub async fn connect(&self) -> Result<(), FeedError> {
        self.send(Command::Connect).await
    }

    pub async fn subscribe_to_address(&self, address: Address) -> Result<(), FeedError> {
        self.send(Command::Subscribe(SubscriptionTarget::Account(address)))
            .await
    }

    /// Watch every account owned by `program`.
    pub async fn subscribe_to_address_class(&self, program: Address) -> Result<(), FeedError> {
        self.send(Command::Subscribe(SubscriptionTarget::Program(program)))
            .await
    }

    pub async fn unsubscribe(&self, address: Address) -> Result<(), FeedError> {
        self.send(Command::Unsubscribe(SubscriptionTarget::Account(address)))
            .await
    }

    /// Close the connection on purpose. It stays closed until
    /// [`connect`](Self::connect) is called again.
    pub async fn disconnect(&self) -> Result<(), FeedError> {
        self.send(Command::Disconnect).await
    }

    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().state == FeedState::Connected
    }

    pub fn subscription_count(&self) -> usize {
        self.status_rx.borrow().subscription_count
    }

    pub fn status(&self) -> FeedStatus {
        *self.status_rx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.status_rx.clone()
    }
}

/// Owns the WebSocket connection and the subscription registry.
///
/// Confirmed notifications are classified and pushed onto the event
/// queue. Unexpected closes are retried with exponential backoff; once
/// the attempt ceiling is hit the status turns [`FeedState::Failed`] and
/// the client waits for an explicit `connect`.
pub struct SubscriptionClient {
    config: FeedConfig,
    queue: Arc<dyn EventQueue>,
    registry: SubscriptionRegistry,
    backoff: Backoff,
    /// Events the queue refused, oldest first. Survives reconnects.
    pending: VecDeque<QueuedEvent>,
    command_rx: mpsc::Receiver<Command>,
    status_tx: watch::Sender<FeedStatus>,
}

impl SubscriptionClient {
    pub fn new(config: FeedConfig, queue: Arc<dyn EventQueue>) -> (Self, FeedHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(FeedStatus {
            state: FeedState::Disconnected,
            subscription_count: 0,
            reconnect_attempts: 0,
        });
        let client = Self {
            registry: SubscriptionRegistry::new(config.commitment.clone()),
            backoff: Backoff::new(
                config.reconnect_base_delay,
                config.reconnect_max_delay,
                config.max_reconnect_attempts,
            ),
            config,
            queue,
            pending: VecDeque::new(),
            command_rx,
            status_tx,
        };
        let handle = FeedHandle {
            command_tx,
            status_rx,
        };
        (client, handle)
    }

    /// Run until shutdown is signaled or every [`FeedHandle`] is dropped.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(url = %self.config.ws_url, "SubscriptionClient started");
        let mut want_connected = false;

        'outer: loop {
            if !want_connected {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break 'outer;
                        }
                    }

                    command = self.command_rx.recv() => match command {
                        None => break 'outer,
                        Some(Command::Connect) => {
                            self.backoff.reset();
                            want_connected = true;
                        }
                        Some(Command::Disconnect) => {}
                        Some(other) => self.apply_offline(other),
                    }
                }
                continue;
            }

            self.set_state(FeedState::Connecting);
            let connect = tokio::time::timeout(
                self.config.request_timeout,
                connect_async(self.config.ws_url.as_str()),
            )
            .await;
            match connect {
                Ok(Ok((ws, _response))) => {
                    self.backoff.reset();
                    self.set_state(FeedState::Connected);
                    match self.drive(ws, &mut shutdown_rx).await {
                        SessionEnd::Shutdown => break 'outer,
                        SessionEnd::Disconnect => {
                            info!("Feed disconnected on request");
                            want_connected = false;
                            self.set_state(FeedState::Disconnected);
                            continue;
                        }
                        SessionEnd::Dropped(reason) => {
                            warn!(reason = %reason, "Feed connection dropped");
                        }
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "Feed connect failed"),
                Err(_) => warn!(timeout = ?self.config.request_timeout, "Feed connect timed out"),
            }

            self.set_state(FeedState::Disconnected);
            let Some(delay) = self.backoff.next_delay() else {
                error!(
                    attempts = self.backoff.attempt(),
                    "Feed reconnect attempts exhausted, giving up"
                );
                self.set_state(FeedState::Failed);
                want_connected = false;
                continue;
            };
            self.status_tx
                .send_modify(|s| s.reconnect_attempts = self.backoff.attempt());
            info!(delay = ?delay, attempt = self.backoff.attempt(), "Reconnecting to feed");

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break 'outer;
                        }
                    }

                    command = self.command_rx.recv() => match command {
                        None => break 'outer,
                        Some(Command::Disconnect) => {
                            want_connected = false;
                            break;
                        }
                        Some(Command::Connect) => {}
                        Some(other) => self.apply_offline(other),
                    },

                    _ = &mut sleep => break,
                }
            }
        }

        self.set_state(FeedState::Disconnected);
        if !self.pending.is_empty() {
            error!(
                pending = self.pending.len(),
                "Shutting down with notifications the queue never accepted"
            );
        }
        info!("SubscriptionClient shutdown complete");
    }

    fn set_state(&self, state: FeedState) {
        self.status_tx.send_modify(|s| {
            s.state = state;
            if state == FeedState::Connected {
                s.reconnect_attempts = 0;
            }
        });
    }

    fn publish_count(&self) {
        let count = self.registry.subscription_count();
        self.status_tx
            .send_modify(|s| s.subscription_count = count);
    }

    /// Registry changes while there is no socket; requests are sent on the
    /// next connect.
    fn apply_offline(&mut self, command: Command) {
        match command {
            Command::Subscribe(target) => {
                self.registry.subscribe(target);
            }
            Command::Unsubscribe(target) => {
                self.registry.unsubscribe(&target);
            }
            Command::Connect | Command::Disconnect => {}
        }
        self.publish_count();
    }

    async fn drive(&mut self, ws: WsStream, shutdown_rx: &mut watch::Receiver<bool>) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        self.drain_pending().await;

        let requests = self.registry.reset_for_reconnect();
        let resent = requests.len();
        for request in requests {
            if let Err(e) = sink.send(Message::Text(request)).await {
                return SessionEnd::Dropped(e.to_string());
            }
        }
        info!(subscriptions = resent, "Feed connected, subscriptions sent");

        let heartbeat_every = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sweep_every = (self.config.confirmation_timeout / 2).max(Duration::from_secs(1));
        let mut sweep = interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry = interval_at(Instant::now() + PUSH_RETRY_MAX, PUSH_RETRY_MAX);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }

                command = self.command_rx.recv() => {
                    let request = match command {
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(Command::Disconnect) => {
                            let _ = sink.send(Message::Close(None)).await;
                            return SessionEnd::Disconnect;
                        }
                        Some(Command::Connect) => None,
                        Some(Command::Subscribe(target)) => {
                            debug!(subscription = %target, "Subscribing");
                            self.registry.subscribe(target)
                        }
                        Some(Command::Unsubscribe(target)) => {
                            debug!(subscription = %target, "Unsubscribing");
                            self.registry.unsubscribe(&target)
                        }
                    };
                    self.publish_count();
                    if let Some(request) = request {
                        if let Err(e) = sink.send(Message::Text(request)).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                }

                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_text(&text, &mut sink).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Dropped(format!("closed by peer: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                },

                _ = heartbeat.tick() => {
                    if awaiting_pong {
                        warn!("No pong received since the previous heartbeat");
                    }
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                    awaiting_pong = true;
                }

                _ = retry.tick(), if !self.pending.is_empty() => {
                    self.drain_pending().await;
                }

                _ = sweep.tick() => {
                    let expired = self
                        .registry
                        .expire_buffers(Instant::now(), self.config.confirmation_timeout);
                    for buffer in expired {
                        error!(
                            subscription_id = buffer.subscription_id,
                            dropped = buffer.dropped,
                            "Subscription never confirmed, dropping buffered notifications"
                        );
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str, sink: &mut WsSink) -> Result<(), FeedError> {
        let message = match parse_message(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable feed message");
                return Ok(());
            }
        };

        match message {
            FeedMessage::Response { request_id, result } => {
                match self.registry.handle_response(request_id, result) {
                    ResponseOutcome::Confirmed {
                        target,
                        subscription_id,
                        ready,
                    } => {
                        debug!(subscription = %target, subscription_id, buffered = ready.len(), "Subscription confirmed");
                        for (address, notification) in ready {
                            self.enqueue(address, notification).await?;
                        }
                    }
                    ResponseOutcome::Orphaned { unsubscribe } => {
                        sink.send(Message::Text(unsubscribe)).await?;
                    }
                    ResponseOutcome::Rejected { target, error } => {
                        self.publish_count();
                        error!(subscription = %target, code = error.code, reason = %error.message, "Subscription rejected");
                    }
                    ResponseOutcome::Unsubscribed { target } => {
                        debug!(subscription = %target, "Unsubscribed");
                    }
                    ResponseOutcome::Unknown => {
                        debug!(request_id, "Ignoring response to unknown request");
                    }
                }
            }
            FeedMessage::Notification(notification) => {
                let subscription_id = notification.subscription_id;
                match self.registry.route_notification(notification, Instant::now()) {
                    Routed::Ready(address, notification) => {
                        self.enqueue(address, notification).await?;
                    }
                    Routed::Buffered => {
                        debug!(subscription_id, "Buffered notification for unconfirmed subscription");
                    }
                    Routed::Unattributable => {
                        warn!(subscription_id, "Program notification without pubkey");
                    }
                }
            }
            FeedMessage::Other => {}
        }
        Ok(())
    }

    /// Hand a notification to the queue. A push that keeps failing parks
    /// the event in `pending`; an overfull backlog ends the session.
    async fn enqueue(
        &mut self,
        address: Address,
        notification: AccountNotification,
    ) -> Result<(), FeedError> {
        let event = QueuedEvent::account_update(address, notification.slot, notification.data);
        if self.pending.is_empty() {
            if let Err(event) = self.push_with_retry(event).await {
                self.pending.push_back(event);
            }
        } else {
            // stay behind older events still waiting for the queue
            self.pending.push_back(event);
            self.drain_pending().await;
        }

        if self.pending.len() >= PENDING_LIMIT {
            return Err(FeedError::QueueBacklog(self.pending.len()));
        }
        Ok(())
    }

    async fn push_with_retry(&self, event: QueuedEvent) -> Result<(), QueuedEvent> {
        let mut backoff = Backoff::new(PUSH_RETRY_BASE, PUSH_RETRY_MAX, PUSH_RETRY_ATTEMPTS);
        loop {
            match self.queue.push(event.clone()).await {
                Ok(id) => {
                    log_pushed(&event, id);
                    return Ok(());
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(address = %event.address, slot = event.slot, error = %e, delay = ?delay, "Queue push failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(address = %event.address, slot = event.slot, error = %e, "Queue push failed, holding notification");
                        return Err(event);
                    }
                },
            }
        }
    }

    /// Push parked events in arrival order, stopping at the first failure.
    async fn drain_pending(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            match self.queue.push(event.clone()).await {
                Ok(id) => log_pushed(&event, id),
                Err(e) => {
                    warn!(pending = self.pending.len() + 1, error = %e, "Queue still unavailable");
                    self.pending.push_front(event);
                    return;
                }
            }
        }
    }
}

fn log_pushed(event: &QueuedEvent, id: Option<uuid::Uuid>) {
    match id {
        Some(id) => debug!(address = %event.address, slot = event.slot, class = %event.account_class, event_id = %id, "Event enqueued"),
        None => debug!(address = %event.address, slot = event.slot, "Duplicate notification skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{FailOutcome, MemoryEventQueue, QueueError, QueueStats};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    /// Memory queue whose first `failures` pushes error out.
    struct FlakyQueue {
        inner: MemoryEventQueue,
        failures: AtomicU32,
    }

    impl FlakyQueue {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryEventQueue::new(QueueConfig::default()),
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl EventQueue for FlakyQueue {
        async fn push(&self, event: QueuedEvent) -> Result<Option<uuid::Uuid>, QueueError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                let err = serde_json::from_str::<Value>("{").unwrap_err();
                return Err(QueueError::Serde(err));
            }
            self.inner.push(event).await
        }

        async fn pop(&self, timeout: Duration) -> Result<Option<QueuedEvent>, QueueError> {
            self.inner.pop(timeout).await
        }

        async fn ack(&self, id: uuid::Uuid) -> Result<(), QueueError> {
            self.inner.ack(id).await
        }

        async fn fail(&self, event: QueuedEvent, error: &str) -> Result<FailOutcome, QueueError> {
            self.inner.fail(event, error).await
        }

        async fn stats(&self) -> Result<QueueStats, QueueError> {
            self.inner.stats().await
        }

        async fn recover_stale(&self) -> Result<u64, QueueError> {
            self.inner.recover_stale().await
        }

        async fn dead_letters(&self, limit: usize) -> Result<(Vec<QueuedEvent>, u64), QueueError> {
            self.inner.dead_letters(limit).await
        }

        async fn clear_dead_letters(&self) -> Result<u64, QueueError> {
            self.inner.clear_dead_letters().await
        }

        async fn replay_dead_letters(&self) -> Result<u64, QueueError> {
            self.inner.replay_dead_letters().await
        }
    }

    /// Accepts one client, confirms its first subscribe as `subscription`,
    /// then sends one notification per slot.
    fn serve_notifications(
        listener: TcpListener,
        subscription: u64,
        slots: Vec<u64>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let request = loop {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    break serde_json::from_str::<Value>(&text).unwrap();
                }
            };
            let confirm = json!({"jsonrpc": "2.0", "result": subscription, "id": request["id"]});
            ws.send(Message::Text(confirm.to_string())).await.unwrap();
            for slot in slots {
                ws.send(Message::Text(notification(subscription, slot))).await.unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
    }

    fn config(ws_url: String) -> FeedConfig {
        let mut config = FeedConfig::new(ws_url, "http://127.0.0.1:1".into(), Address::new([7; 32]));
        config.reconnect_base_delay = Duration::from_millis(10);
        config.max_reconnect_attempts = 2;
        config.request_timeout = Duration::from_secs(2);
        config
    }

    fn notification(subscription: u64, slot: u64) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "accountNotification",
            "params": {
                "result": {
                    "context": {"slot": slot},
                    "value": {"data": ["AQID", "base64"], "lamports": 1}
                },
                "subscription": subscription
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn notifications_ahead_of_confirmation_reach_the_queue_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let request = loop {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    break serde_json::from_str::<Value>(&text).unwrap();
                }
            };
            assert_eq!(request["method"], "accountSubscribe");
            ws.send(Message::Text(notification(42, 100))).await.unwrap();
            ws.send(Message::Text(notification(42, 101))).await.unwrap();
            let confirm = json!({"jsonrpc": "2.0", "result": 42, "id": request["id"]});
            ws.send(Message::Text(confirm.to_string())).await.unwrap();
            // hold the socket open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
        let (client, handle) = SubscriptionClient::new(config(url), queue.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let address = Address::new([3; 32]);
        handle.subscribe_to_address(address).await.unwrap();
        handle.connect().await.unwrap();

        let first = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!((first.slot, second.slot), (100, 101));
        assert_eq!(first.address, address);
        assert!(handle.is_connected());
        assert_eq!(handle.subscription_count(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!handle.is_connected());
        server.abort();
    }

    #[tokio::test]
    async fn exhausted_reconnects_surface_failed_state() {
        // bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
        let (client, handle) = SubscriptionClient::new(config(url), queue);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let mut status = handle.watch_status();
        handle.connect().await.unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.state == FeedState::Failed),
        )
        .await
        .unwrap()
        .unwrap();

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn subscriptions_are_tracked_while_offline() {
        let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
        let (client, handle) = SubscriptionClient::new(config("ws://127.0.0.1:1".into()), queue);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        let mut status = handle.watch_status();
        handle.subscribe_to_address_class(Address::new([1; 32])).await.unwrap();
        handle.subscribe_to_address(Address::new([2; 32])).await.unwrap();
        status
            .wait_for(|s| s.subscription_count == 2)
            .await
            .unwrap();
        handle.unsubscribe(Address::new([2; 32])).await.unwrap();
        status
            .wait_for(|s| s.subscription_count == 1)
            .await
            .unwrap();
        assert!(!handle.is_connected());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn transient_push_failure_does_not_lose_the_notification() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = serve_notifications(listener, 42, vec![100]);

        let queue = Arc::new(FlakyQueue::new(1));
        let (client, handle) = SubscriptionClient::new(config(url), queue.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        handle.subscribe_to_address(Address::new([3; 32])).await.unwrap();
        handle.connect().await.unwrap();

        let event = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(event.slot, 100);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn parked_notifications_are_delivered_in_order_once_the_queue_recovers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = serve_notifications(listener, 7, vec![100, 101]);

        // enough failures to exhaust the inline retries for slot 100
        let queue = Arc::new(FlakyQueue::new(PUSH_RETRY_ATTEMPTS + 1));
        let (client, handle) = SubscriptionClient::new(config(url), queue.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(client.run(shutdown_rx));

        handle.subscribe_to_address(Address::new([3; 32])).await.unwrap();
        handle.connect().await.unwrap();

        let first = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        let second = queue.pop(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!((first.slot, second.slot), (100, 101));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        server.abort();
    }
}
