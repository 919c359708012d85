//! Admin API handlers.
//!
//! Every endpoint requires the `Plp-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET    /dead-letters`                – list dead-lettered events
//! - `DELETE /dead-letters`                – drop every dead letter
//! - `POST   /dead-letters/replay`         – move dead letters back to the queue
//! - `POST   /markets/{address}/resync`    – re-fetch and reconcile a market
//! - `POST   /markets/{address}/resolved`  – notify that a market was resolved

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use plp_sync_core::accounts::{AccountClass, Address};
use plp_sync_core::events::QueuedEvent;
use plp_sync_core::queue::QueueError;
use plp_sync_sdk::objects::{DeadLetterList, EnqueueResponse, ReplayResponse};
use serde::Deserialize;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

const DEFAULT_DEAD_LETTER_LIMIT: usize = 100;
const MAX_DEAD_LETTER_LIMIT: usize = 1000;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/dead-letters",
            get(list_dead_letters).delete(clear_dead_letters),
        )
        .route("/dead-letters/replay", post(replay_dead_letters))
        .route("/markets/{address}/resync", post(request_resync))
        .route("/markets/{address}/resolved", post(notify_resolved))
}

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Queue(QueueError),
    InvalidAddress(String),
}

impl From<QueueError> for AdminApiError {
    fn from(e: QueueError) -> Self {
        AdminApiError::Queue(e)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Queue(e) => {
                tracing::error!(error = %e, "Admin API queue error");
                (StatusCode::SERVICE_UNAVAILABLE, "queue unavailable").into_response()
            }
            AdminApiError::InvalidAddress(address) => (
                StatusCode::BAD_REQUEST,
                format!("invalid market address: {address}"),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeadLetterQuery {
    limit: Option<usize>,
}

async fn list_dead_letters(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<DeadLetterQuery>,
) -> Result<Json<DeadLetterList>, AdminApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .min(MAX_DEAD_LETTER_LIMIT);
    let (events, total) = state.queue.dead_letters(limit).await?;
    Ok(Json(DeadLetterList {
        entries: events.iter().map(QueuedEvent::to_dead_letter_entry).collect(),
        total,
    }))
}

async fn clear_dead_letters(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<StatusCode, AdminApiError> {
    let cleared = state.queue.clear_dead_letters().await?;
    tracing::info!(cleared, "Admin cleared dead letters");
    Ok(StatusCode::NO_CONTENT)
}

async fn replay_dead_letters(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<Json<ReplayResponse>, AdminApiError> {
    let replayed = state.queue.replay_dead_letters().await?;
    tracing::info!(replayed, "Admin replayed dead letters");
    Ok(Json(ReplayResponse { replayed }))
}

async fn request_resync(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(address): Path<String>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AdminApiError> {
    let address = parse_market(address)?;
    enqueue(&state, QueuedEvent::resync(address, AccountClass::Market)).await
}

async fn notify_resolved(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(address): Path<String>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AdminApiError> {
    let address = parse_market(address)?;
    enqueue(&state, QueuedEvent::market_resolved(address)).await
}

fn parse_market(address: String) -> Result<Address, AdminApiError> {
    address
        .parse()
        .map_err(|_| AdminApiError::InvalidAddress(address))
}

async fn enqueue(
    state: &AppState,
    event: QueuedEvent,
) -> Result<(StatusCode, Json<EnqueueResponse>), AdminApiError> {
    let kind = event.kind().as_str();
    let address = event.address;
    let event_id = state.queue.push(event).await?;
    tracing::info!(
        address = %address,
        kind,
        duplicate = event_id.is_none(),
        "Admin enqueued event"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            event_id,
            duplicate: event_id.is_none(),
        }),
    ))
}
