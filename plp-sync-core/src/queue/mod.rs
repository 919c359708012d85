//! Durable event queue between the ledger feed and the processors.
//!
//! Delivery is at-least-once: a popped event sits in a processing area
//! with a TTL until it is acked or failed, and [`EventQueue::recover_stale`]
//! re-enqueues entries whose worker went away. Every operation is a single
//! atomic step at the store level.

pub mod memory;
pub mod recovery;
pub mod redis;

pub use memory::MemoryEventQueue;
pub use recovery::StaleEventSweeper;
pub use redis::RedisEventQueue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::events::QueuedEvent;

/// Failures at or above this count move an event to the dead-letter lane.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Store(#[from] ::redis::RedisError),

    #[error("queued event is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_length: u64,
    pub processing_count: u64,
    pub dlq_length: u64,
}

/// What [`EventQueue::fail`] did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Requeued { retry_count: u32 },
    DeadLettered,
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Enqueue an event. Returns `None` when a duplicate marker for the
    /// event already exists.
    async fn push(&self, event: QueuedEvent) -> Result<Option<Uuid>, QueueError>;

    /// Wait up to `timeout` for the next event and move it to processing.
    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedEvent>, QueueError>;

    async fn ack(&self, id: Uuid) -> Result<(), QueueError>;

    /// Record a failure, then re-enqueue or dead-letter the event.
    async fn fail(&self, event: QueuedEvent, error: &str) -> Result<FailOutcome, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// Re-enqueue in-flight events whose processing TTL is about to lapse.
    async fn recover_stale(&self) -> Result<u64, QueueError>;

    /// Up to `limit` dead letters, oldest first, plus the lane's length.
    async fn dead_letters(&self, limit: usize) -> Result<(Vec<QueuedEvent>, u64), QueueError>;

    async fn clear_dead_letters(&self) -> Result<u64, QueueError>;

    /// Move every dead letter back to the queue with its retry count reset.
    async fn replay_dead_letters(&self) -> Result<u64, QueueError>;
}

/// Applies a failure to the event and decides where it goes next.
pub(crate) fn record_failure(event: &mut QueuedEvent, error: &str) -> FailOutcome {
    event.retry_count += 1;
    event.last_error = Some(error.to_string());
    if event.retry_count >= MAX_RETRIES {
        FailOutcome::DeadLettered
    } else {
        FailOutcome::Requeued {
            retry_count: event.retry_count,
        }
    }
}
