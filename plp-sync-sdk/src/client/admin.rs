//! Admin API client (operator tooling → sync service).
//!
//! Every request carries the plaintext admin secret in the
//! `Plp-Admin-Authorization` header.

use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::{
    ADMIN_AUTH_HEADER, DeadLetterList, EnqueueResponse, ReplayResponse, SyncStatus,
};

/// Typed HTTP client for the status and admin endpoints.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    secret: String,
}

impl AdminClient {
    pub fn new(base_url: Url, secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /status` – pipeline status (no authentication).
    pub async fn status(&self) -> Result<SyncStatus, ClientError> {
        let url = self.base_url.join("/status")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /admin/dead-letters`
    pub async fn dead_letters(&self) -> Result<DeadLetterList, ClientError> {
        let url = self.base_url.join("/admin/dead-letters")?;
        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.secret)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `DELETE /admin/dead-letters` – drop every dead-lettered event.
    pub async fn clear_dead_letters(&self) -> Result<(), ClientError> {
        let url = self.base_url.join("/admin/dead-letters")?;
        let resp = self
            .http
            .delete(url)
            .header(ADMIN_AUTH_HEADER, &self.secret)
            .send()
            .await?;
        expect_success(resp).await
    }

    /// `POST /admin/dead-letters/replay` – move dead letters back to the queue.
    pub async fn replay_dead_letters(&self) -> Result<ReplayResponse, ClientError> {
        let url = self.base_url.join("/admin/dead-letters/replay")?;
        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.secret)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /admin/markets/{address}/resync` – refetch and reconcile a market.
    pub async fn request_resync(&self, address: &str) -> Result<EnqueueResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/admin/markets/{address}/resync"))?;
        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.secret)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /admin/markets/{address}/resolved` – report a submitted resolve
    /// transaction so the market is reconciled as soon as it lands.
    pub async fn notify_resolved(&self, address: &str) -> Result<EnqueueResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/admin/markets/{address}/resolved"))?;
        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.secret)
            .send()
            .await?;
        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}

async fn expect_success(resp: reqwest::Response) -> Result<(), ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    Ok(())
}
