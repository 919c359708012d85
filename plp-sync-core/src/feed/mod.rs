//! Ledger feed: a persistent JSON-RPC WebSocket connection that turns
//! account change notifications into queued events.
//!
//! [`SubscriptionClient`] owns the connection and runs as a task;
//! [`FeedHandle`] is the cloneable control surface used by the rest of the
//! process (watch-list manager, admin API, status endpoint).

pub mod backoff;
pub mod client;
pub mod fetch;
pub mod registry;
pub mod rpc;
pub mod watchlist;

pub use backoff::Backoff;
pub use client::{FeedHandle, FeedStatus, SubscriptionClient};
pub use fetch::{AccountFetcher, FetchError, FetchedAccount, HttpAccountFetcher};
pub use registry::SubscriptionRegistry;
pub use rpc::SubscriptionTarget;
pub use watchlist::WatchListManager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed feed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed protocol error: {0}")]
    Protocol(String),

    #[error("queue unavailable, {0} notifications waiting")]
    QueueBacklog(usize),

    #[error("feed connection task is gone")]
    Closed,
}
