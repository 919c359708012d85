//! Application state shared across all request handlers.

use crate::config::AdminConfig;
use plp_sync_core::broadcast::BroadcastHub;
use plp_sync_core::feed::FeedHandle;
use plp_sync_core::processor::ProcessorStatus;
use plp_sync_core::queue::EventQueue;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Control and status surface of the subscription client.
    pub feed: FeedHandle,
    pub queue: Arc<dyn EventQueue>,
    pub processor: ProcessorStatus,
    /// Stream consumers subscribe here.
    pub hub: BroadcastHub,
    /// Reloaded via SIGHUP.
    pub admin: Arc<RwLock<AdminConfig>>,
}

impl AppState {
    pub fn new(
        feed: FeedHandle,
        queue: Arc<dyn EventQueue>,
        processor: ProcessorStatus,
        hub: BroadcastHub,
        admin: AdminConfig,
    ) -> Self {
        Self {
            feed,
            queue,
            processor,
            hub,
            admin: Arc::new(RwLock::new(admin)),
        }
    }

    /// Update the admin settings (used during SIGHUP reload).
    pub async fn update_admin(&self, admin: AdminConfig) {
        *self.admin.write().await = admin;
    }
}
