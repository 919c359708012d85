//! Runtime configuration types.
//!
//! These are the validated values the pipeline components are built
//! from. Loading and parsing the TOML file is the server crate's job.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use std::time::Duration;

use crate::accounts::Address;

/// Ledger feed and account fetch settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint of the JSON-RPC feed.
    pub ws_url: String,
    /// HTTP endpoint used for `getAccountInfo`.
    pub rpc_url: String,
    /// Program whose accounts are watched as a class.
    pub program_id: Address,
    pub commitment: String,
    pub heartbeat_interval: Duration,
    /// How long notifications for an unconfirmed subscription id are held.
    pub confirmation_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub request_timeout: Duration,
}

impl FeedConfig {
    pub fn new(ws_url: String, rpc_url: String, program_id: Address) -> Self {
        Self {
            ws_url,
            rpc_url,
            program_id,
            commitment: "confirmed".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Event queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Prefix for every key the Redis queue touches.
    pub key_prefix: String,
    pub dedup_ttl: Duration,
    pub processing_ttl: Duration,
    /// In-flight entries with less remaining TTL than this are re-enqueued.
    pub recovery_threshold: Duration,
    pub recovery_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: "plp:events".to_string(),
            dedup_ttl: Duration::from_secs(60),
            processing_ttl: Duration::from_secs(300),
            recovery_threshold: Duration::from_secs(60),
            recovery_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub workers: usize,
    pub pop_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            pop_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Minimum spacing between two emissions for the same key.
    pub min_interval: Duration,
    /// Delay before a coalesced payload is flushed.
    pub coalesce_delay: Duration,
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            coalesce_delay: Duration::from_millis(50),
            channel_capacity: 1024,
        }
    }
}
