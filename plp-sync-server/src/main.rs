//! PLP Sync Server
//!
//! Keeps the prediction market read model in step with the ledger and
//! streams redacted updates to consumers.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, LoadedConfig, QueueBackend, get_database_url, get_redis_url};
use plp_sync_core::broadcast::{BroadcastHub, Broadcaster};
use plp_sync_core::config::ConfigStore;
use plp_sync_core::feed::{AccountFetcher, HttpAccountFetcher, SubscriptionClient, WatchListManager};
use plp_sync_core::processor::{EventProcessor, Reconciler};
use plp_sync_core::queue::{EventQueue, MemoryEventQueue, RedisEventQueue, StaleEventSweeper};
use plp_sync_core::store::{PgReadModelStore, ReadModelStore};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Background tasks get this long to finish after the server stops.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// PLP Sync - real-time read model sync for on-chain prediction markets
#[derive(Parser, Debug)]
#[command(name = "plp-sync-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./plp-sync.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PLP_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting plp-sync-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let queue = connect_queue(&loaded_config).await?;
    let store: Arc<dyn ReadModelStore> = Arc::new(PgReadModelStore::new(db_pool.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    // Fan-out
    let hub = BroadcastHub::new(loaded_config.broadcast.channel_capacity);
    let broadcaster = Broadcaster::new(Arc::new(hub.clone()), loaded_config.broadcast.clone());

    // Subscription client
    let (client, feed) = SubscriptionClient::new(loaded_config.feed.clone(), queue.clone());
    tasks.push(tokio::spawn(client.run(shutdown_rx.clone())));

    // Event processor workers
    let fetcher: Arc<dyn AccountFetcher> = Arc::new(HttpAccountFetcher::new(&loaded_config.feed));
    let reconciler = Arc::new(Reconciler::new(store.clone(), broadcaster));
    let processor = EventProcessor::new(
        queue.clone(),
        fetcher,
        reconciler,
        loaded_config.processor.clone(),
    );
    for worker in 0..loaded_config.processor.workers {
        tasks.push(tokio::spawn(processor.clone().run(worker, shutdown_rx.clone())));
    }

    // Stale in-flight recovery
    let sweeper = StaleEventSweeper::new(queue.clone(), loaded_config.queue.recovery_interval);
    tasks.push(tokio::spawn(sweeper.run(shutdown_rx.clone())));

    // Startup watch set: the program class, every unresolved market and the
    // configured watch list
    feed.connect().await?;
    feed.subscribe_to_address_class(loaded_config.feed.program_id)
        .await?;
    let unresolved = store.unresolved_markets().await?;
    tracing::info!(markets = unresolved.len(), "Watching unresolved markets");
    for address in &unresolved {
        feed.subscribe_to_address(*address).await?;
    }
    let watch_list_store = ConfigStore::new(loaded_config.watch_addresses.clone());
    let watch_list = WatchListManager::new(feed.clone(), unresolved);
    tasks.push(tokio::spawn(watch_list.run(
        shutdown_rx.clone(),
        watch_list_store.clone(),
        watch_list_store.subscribe(),
    )));

    let state = AppState::new(
        feed,
        queue,
        processor.status(),
        hub,
        loaded_config.admin.clone(),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify =
        spawn_config_reload_handler(state.clone(), config_loader, watch_list_store);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", loaded_config.listen);
    let result = run_server(router, loaded_config.listen).await;

    // Stop background tasks
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    let drain = futures_util::future::join_all(tasks);
    if tokio::time::timeout(TASK_DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Background tasks did not stop in time");
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_queue(config: &LoadedConfig) -> anyhow::Result<Arc<dyn EventQueue>> {
    match config.queue_backend {
        QueueBackend::Redis => {
            let redis_url = get_redis_url().map_err(|e| {
                tracing::error!("REDIS_URL environment variable not set");
                e
            })?;
            let queue = RedisEventQueue::connect(&redis_url, config.queue.clone())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to queue store: {}", e);
                    e
                })?;
            tracing::info!("Queue store connection established");
            Ok(Arc::new(queue))
        }
        QueueBackend::Memory => {
            tracing::warn!("Using the in-memory event queue, queued events are lost on restart");
            Ok(Arc::new(MemoryEventQueue::new(config.queue.clone())))
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
