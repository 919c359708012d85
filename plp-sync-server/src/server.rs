//! Axum server setup and router configuration.

use crate::api::{admin, status, stream};
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status::status))
        .route("/stream", get(stream::stream))
        .nest("/admin", admin::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdminConfig, hash_secret};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use plp_sync_core::accounts::Address;
    use plp_sync_core::broadcast::BroadcastHub;
    use plp_sync_core::config::{FeedConfig, QueueConfig};
    use plp_sync_core::events::QueuedEvent;
    use plp_sync_core::feed::SubscriptionClient;
    use plp_sync_core::processor::ProcessorStatus;
    use plp_sync_core::queue::{EventQueue, MemoryEventQueue};
    use plp_sync_sdk::objects::{ADMIN_AUTH_HEADER, DeadLetterList, EnqueueResponse, SyncStatus};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "correct horse";

    fn app() -> (Router, Arc<MemoryEventQueue>) {
        let queue = Arc::new(MemoryEventQueue::new(QueueConfig::default()));
        let (_client, feed) = SubscriptionClient::new(
            FeedConfig::new(
                "ws://127.0.0.1:1".into(),
                "http://127.0.0.1:1".into(),
                Address::new([9; 32]),
            ),
            queue.clone(),
        );
        let state = AppState::new(
            feed,
            queue.clone(),
            ProcessorStatus::default(),
            BroadcastHub::new(16),
            AdminConfig {
                secret_hash: hash_secret(SECRET).unwrap(),
            },
        );
        (build_router(state), queue)
    }

    fn admin_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(ADMIN_AUTH_HEADER, SECRET)
            .body(Body::empty())
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (router, _) = app();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_queue_counters() {
        let (router, queue) = app();
        queue
            .push(QueuedEvent::account_update(Address::new([1; 32]), 5, vec![]))
            .await
            .unwrap();

        let response = router
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status: SyncStatus = json(response).await;
        assert!(!status.connected);
        assert!(!status.processor_running);
        assert_eq!(status.queue_length, 1);
        assert_eq!(status.dlq_length, 0);
    }

    #[tokio::test]
    async fn admin_requires_the_secret() {
        let (router, _) = app();
        let response = router
            .clone()
            .oneshot(Request::get("/admin/dead-letters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(
                Request::get("/admin/dead-letters")
                    .header(ADMIN_AUTH_HEADER, "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn dead_letters_are_listed() {
        let (router, _) = app();
        let response = router
            .oneshot(admin_request("GET", "/admin/dead-letters?limit=10"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list: DeadLetterList = json(response).await;
        assert!(list.entries.is_empty());
        assert_eq!(list.total, 0);
    }

    #[tokio::test]
    async fn resolved_notice_is_enqueued_once() {
        let (router, queue) = app();
        let uri = format!("/admin/markets/{}/resolved", Address::new([4; 32]));

        let response = router
            .clone()
            .oneshot(admin_request("POST", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let first: EnqueueResponse = json(response).await;
        assert!(first.event_id.is_some());
        assert!(!first.duplicate);

        let response = router.oneshot(admin_request("POST", &uri)).await.unwrap();
        let second: EnqueueResponse = json(response).await;
        assert!(second.duplicate);
        assert_eq!(queue.stats().await.unwrap().queue_length, 1);
    }

    #[tokio::test]
    async fn resync_rejects_malformed_address() {
        let (router, _) = app();
        let response = router
            .oneshot(admin_request("POST", "/admin/markets/not-an-address/resync"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
