//! Configuration module for plp-sync-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;

use crate::config::file::FileConfig;
pub use crate::config::file::QueueBackend;
use plp_sync_core::accounts::Address;
use plp_sync_core::config::{BroadcastConfig, FeedConfig, ProcessorConfig, QueueConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("REDIS_URL environment variable not set")]
    MissingRedisUrl,
}

/// Runtime admin settings. Only the hash is kept in memory.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub secret_hash: String,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub admin: AdminConfig,
    pub feed: FeedConfig,
    pub watch_addresses: Vec<Address>,
    pub queue_backend: QueueBackend,
    pub queue: QueueConfig,
    pub processor: ProcessorConfig,
    pub broadcast: BroadcastConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let (program_id, watch_addresses) = self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(build_loaded_config(
            file_config,
            secret_hash,
            program_id,
            watch_addresses,
        ))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(Address, Vec<Address>), ConfigError> {
        if config.admin.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret must not be empty".to_string(),
            ));
        }
        if config.feed.ws_url.is_empty() || config.feed.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "feed ws_url and rpc_url are required".to_string(),
            ));
        }
        if config.processor.workers == 0 {
            return Err(ConfigError::ValidationError(
                "processor needs at least one worker".to_string(),
            ));
        }
        if config.broadcast.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast channel capacity must be positive".to_string(),
            ));
        }
        if config.queue.recovery_threshold_secs >= config.queue.processing_ttl_secs {
            return Err(ConfigError::ValidationError(
                "queue recovery threshold must be below the processing TTL".to_string(),
            ));
        }

        let program_id = parse_address("feed.program_id", &config.feed.program_id)?;
        let watch_addresses = config
            .feed
            .watch_addresses
            .iter()
            .map(|a| parse_address("feed.watch_addresses", a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((program_id, watch_addresses))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // temp file then rename, so a crash never leaves a truncated config
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{field}: {value:?} is not an address: {e}")))
}

pub(crate) fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
    program_id: Address,
    watch_addresses: Vec<Address>,
) -> LoadedConfig {
    let feed = file_config.feed;
    let queue = file_config.queue;
    let processor = file_config.processor;
    let broadcast = file_config.broadcast;

    let mut feed_config = FeedConfig::new(feed.ws_url, feed.rpc_url, program_id);
    feed_config.commitment = feed.commitment;
    feed_config.heartbeat_interval = Duration::from_secs(feed.heartbeat_interval_secs);
    feed_config.confirmation_timeout = Duration::from_secs(feed.confirmation_timeout_secs);
    feed_config.reconnect_base_delay = Duration::from_millis(feed.reconnect_base_delay_ms);
    feed_config.reconnect_max_delay = Duration::from_millis(feed.reconnect_max_delay_ms);
    feed_config.max_reconnect_attempts = feed.max_reconnect_attempts;
    feed_config.request_timeout = Duration::from_secs(feed.request_timeout_secs);

    LoadedConfig {
        listen: file_config.server.listen,
        admin: AdminConfig { secret_hash },
        feed: feed_config,
        watch_addresses,
        queue_backend: queue.backend,
        queue: QueueConfig {
            key_prefix: queue.key_prefix,
            dedup_ttl: Duration::from_secs(queue.dedup_ttl_secs),
            processing_ttl: Duration::from_secs(queue.processing_ttl_secs),
            recovery_threshold: Duration::from_secs(queue.recovery_threshold_secs),
            recovery_interval: Duration::from_secs(queue.recovery_interval_secs),
        },
        processor: ProcessorConfig {
            workers: processor.workers,
            pop_timeout: Duration::from_secs(processor.pop_timeout_secs),
        },
        broadcast: BroadcastConfig {
            min_interval: Duration::from_millis(broadcast.min_interval_ms),
            coalesce_delay: Duration::from_millis(broadcast.coalesce_delay_ms),
            channel_capacity: broadcast.channel_capacity,
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

/// Get the queue store URL from the environment.
pub fn get_redis_url() -> Result<String, ConfigError> {
    std::env::var("REDIS_URL").map_err(|_| ConfigError::MissingRedisUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "11111111111111111111111111111111";

    fn write_config(body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("plp-sync-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, body).unwrap();
        path
    }

    fn config_body(secret: &str, watch: &str) -> String {
        format!(
            r#"
[admin]
secret = "{secret}"

[feed]
ws_url = "wss://rpc.example.com"
rpc_url = "https://rpc.example.com"
program_id = "{PROGRAM}"
watch_addresses = [{watch}]
"#
        )
    }

    #[test]
    fn plaintext_secret_is_hashed_and_persisted() {
        let path = write_config(&config_body("hunter2", ""));
        let loader = ConfigLoader::new(&path, None);

        let first = loader.load().unwrap();
        assert!(first.admin.secret_hash.starts_with("$argon2"));
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&first.admin.secret_hash));
        assert!(!rewritten.contains("hunter2"));

        let second = loader.reload().unwrap();
        assert_eq!(second.admin.secret_hash, first.admin.secret_hash);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn durations_and_overrides_are_applied() {
        let path = write_config(&config_body("$argon2id$v=19$m=19456,t=2,p=1$abc", &format!("\"{PROGRAM}\"")));
        let listen: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(listen)).load().unwrap();

        assert_eq!(loaded.listen, listen);
        assert_eq!(loaded.watch_addresses.len(), 1);
        assert_eq!(loaded.feed.program_id.to_string(), PROGRAM);
        assert_eq!(loaded.feed.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(loaded.feed.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(loaded.broadcast.min_interval, Duration::from_millis(100));
        assert_eq!(loaded.queue.processing_ttl, Duration::from_secs(300));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_watch_address_is_rejected() {
        let path = write_config(&config_body("$argon2id$v=19$m=19456,t=2,p=1$abc", "\"not-base58-0OIl\""));
        let err = ConfigLoader::new(&path, None).load().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        std::fs::remove_file(&path).unwrap();
    }
}
