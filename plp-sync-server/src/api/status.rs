use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use plp_sync_sdk::objects::{FeedState, SyncStatus};

use crate::state::AppState;

/// `GET /status`: feed, processor and queue counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = match state.queue.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read queue stats");
            return (StatusCode::SERVICE_UNAVAILABLE, "queue unavailable").into_response();
        }
    };
    let feed = state.feed.status();

    Json(SyncStatus {
        connected: feed.state == FeedState::Connected,
        feed_state: feed.state,
        processor_running: state.processor.is_running(),
        subscription_count: feed.subscription_count,
        queue_length: stats.queue_length,
        processing_count: stats.processing_count,
        dlq_length: stats.dlq_length,
    })
    .into_response()
}
