//! Process signals: SIGTERM/SIGINT stop the service, SIGHUP reloads config.

use crate::config::ConfigLoader;
use crate::state::AppState;
use plp_sync_core::accounts::Address;
use plp_sync_core::config::ConfigStore;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Resolves on the first SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, stopping");
        }
        _ = sigint.recv() => {
            tracing::info!("SIGINT received, stopping");
        }
    }
}

/// Re-reads the config file on every SIGHUP until the returned [`Notify`]
/// fires.
///
/// Only the admin secret and the feed watch list are applied live; every
/// other section is read at startup.
pub fn spawn_config_reload_handler(
    state: AppState,
    loader: Arc<ConfigLoader>,
    watch_list_store: ConfigStore<Vec<Address>>,
) -> Arc<Notify> {
    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading configuration");
                    match loader.reload() {
                        Ok(loaded_config) => {
                            state.update_admin(loaded_config.admin).await;
                            let addresses = loaded_config.watch_addresses.len();
                            watch_list_store.update(loaded_config.watch_addresses).await;
                            tracing::info!(watch_addresses = addresses, "Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload configuration");
                        }
                    }
                }
                _ = stopped.notified() => {
                    tracing::debug!("Config reload listener stopped");
                    break;
                }
            }
        }
    });

    stop
}
