//! Health and status objects.

use serde::{Deserialize, Serialize};

/// Connection state of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts were exhausted; operator action is required.
    Failed,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub connected: bool,
    pub feed_state: FeedState,
    pub processor_running: bool,
    pub subscription_count: usize,
    pub queue_length: u64,
    pub processing_count: u64,
    pub dlq_length: u64,
}
