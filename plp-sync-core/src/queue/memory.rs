//! In-process queue with the same semantics as the Redis queue.
//!
//! Used by tests and by single-process deployments that accept losing
//! queued events on restart.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{EventQueue, FailOutcome, QueueError, QueueStats, record_failure};
use crate::config::QueueConfig;
use crate::events::QueuedEvent;

pub struct MemoryEventQueue {
    config: QueueConfig,
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    /// Front is the next event to pop.
    queue: VecDeque<QueuedEvent>,
    dedup: HashMap<String, Instant>,
    processing: HashMap<Uuid, (QueuedEvent, Instant)>,
    dlq: Vec<QueuedEvent>,
}

impl MemoryEventQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    async fn try_pop(&self) -> Option<QueuedEvent> {
        let mut state = self.state.lock().await;
        let event = state.queue.pop_front()?;
        let deadline = Instant::now() + self.config.processing_ttl;
        state.processing.insert(event.id, (event.clone(), deadline));
        Some(event)
    }
}

#[async_trait]
impl EventQueue for MemoryEventQueue {
    async fn push(&self, event: QueuedEvent) -> Result<Option<Uuid>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if let Some(key) = event.dedup_key() {
            state.dedup.retain(|_, expires| *expires > now);
            if state.dedup.contains_key(&key) {
                return Ok(None);
            }
            state.dedup.insert(key, now + self.config.dedup_ttl);
        }
        let id = event.id;
        state.queue.push_back(event);
        drop(state);
        self.notify.notify_one();
        Ok(Some(id))
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedEvent>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.try_pop().await {
                return Ok(Some(event));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, id: Uuid) -> Result<(), QueueError> {
        self.state.lock().await.processing.remove(&id);
        Ok(())
    }

    async fn fail(&self, mut event: QueuedEvent, error: &str) -> Result<FailOutcome, QueueError> {
        let outcome = record_failure(&mut event, error);
        let mut state = self.state.lock().await;
        state.processing.remove(&event.id);
        match outcome {
            FailOutcome::Requeued { .. } => {
                state.queue.push_back(event);
                drop(state);
                self.notify.notify_one();
            }
            FailOutcome::DeadLettered => state.dlq.push(event),
        }
        Ok(outcome)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            queue_length: state.queue.len() as u64,
            processing_count: state.processing.len() as u64,
            dlq_length: state.dlq.len() as u64,
        })
    }

    async fn recover_stale(&self) -> Result<u64, QueueError> {
        let threshold = Instant::now() + self.config.recovery_threshold;
        let mut state = self.state.lock().await;
        let stale: Vec<Uuid> = state
            .processing
            .iter()
            .filter(|(_, (_, deadline))| *deadline < threshold)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some((event, _)) = state.processing.remove(id) {
                state.queue.push_front(event);
            }
        }
        drop(state);
        if !stale.is_empty() {
            self.notify.notify_one();
        }
        Ok(stale.len() as u64)
    }

    async fn dead_letters(&self, limit: usize) -> Result<(Vec<QueuedEvent>, u64), QueueError> {
        let state = self.state.lock().await;
        let entries = state.dlq.iter().take(limit).cloned().collect();
        Ok((entries, state.dlq.len() as u64))
    }

    async fn clear_dead_letters(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock().await;
        let cleared = state.dlq.len() as u64;
        state.dlq.clear();
        Ok(cleared)
    }

    async fn replay_dead_letters(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock().await;
        let replayed = std::mem::take(&mut state.dlq);
        let count = replayed.len() as u64;
        for mut event in replayed {
            event.retry_count = 0;
            state.queue.push_back(event);
        }
        drop(state);
        if count > 0 {
            self.notify.notify_one();
        }
        Ok(count)
    }
}
