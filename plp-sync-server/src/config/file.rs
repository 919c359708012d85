//! TOML file configuration structures.
//!
//! These structs directly map to the `plp-sync.toml` file format. Every
//! section except `[server]`, `[admin]` and `[feed]` may be omitted.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Upstream ledger feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub ws_url: String,
    pub rpc_url: String,
    /// Base58 id of the prediction market program.
    pub program_id: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Individual accounts to watch on top of the program class.
    /// Reloaded on SIGHUP.
    #[serde(default)]
    pub watch_addresses: Vec<String>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_confirmation_timeout_secs() -> u64 {
    30
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Where queued events are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Durable store addressed by `REDIS_URL`.
    #[default]
    Redis,
    /// Process memory; events are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub key_prefix: String,
    pub dedup_ttl_secs: u64,
    pub processing_ttl_secs: u64,
    pub recovery_threshold_secs: u64,
    pub recovery_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            key_prefix: "plp:events".to_string(),
            dedup_ttl_secs: 60,
            processing_ttl_secs: 300,
            recovery_threshold_secs: 60,
            recovery_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub workers: usize,
    pub pop_timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            pop_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub min_interval_ms: u64,
    pub coalesce_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            coalesce_delay_ms: 50,
            channel_capacity: 1024,
        }
    }
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
