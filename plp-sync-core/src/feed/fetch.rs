//! Point-in-time account reads over JSON-RPC HTTP.
//!
//! Used when an event carries no account bytes of its own (operator
//! resyncs and resolution notices).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::FeedError;
use super::rpc::{Context, RpcError, UiAccount};
use crate::accounts::Address;
use crate::config::FeedConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("RPC request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC rate limit exceeded")]
    RateLimited,

    #[error("invalid account payload: {0}")]
    Payload(#[from] FeedError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAccount {
    /// Slot the read was served at.
    pub slot: u64,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait AccountFetcher: Send + Sync {
    /// Current state of `address`, or `None` if the account does not exist.
    async fn fetch_account(&self, address: &Address) -> Result<Option<FetchedAccount>, FetchError>;
}

pub struct HttpAccountFetcher {
    rpc_url: String,
    commitment: String,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct GetAccountInfoResponse {
    result: Option<GetAccountInfoResult>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct GetAccountInfoResult {
    context: Context,
    value: Option<UiAccount>,
}

impl HttpAccountFetcher {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            commitment: config.commitment.clone(),
            http_client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl AccountFetcher for HttpAccountFetcher {
    async fn fetch_account(&self, address: &Address) -> Result<Option<FetchedAccount>, FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": [
                address.to_string(),
                {"encoding": "base64", "commitment": self.commitment}
            ]
        });
        let response = self.http_client.post(&self.rpc_url).json(&body).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        let response: GetAccountInfoResponse = response.error_for_status()?.json().await?;
        parse_account_info(response)
    }
}

fn parse_account_info(
    response: GetAccountInfoResponse,
) -> Result<Option<FetchedAccount>, FetchError> {
    if let Some(RpcError { code, message }) = response.error {
        return Err(FetchError::Rpc { code, message });
    }
    let Some(result) = response.result else {
        return Ok(None);
    };
    let Some(account) = result.value else {
        return Ok(None);
    };
    Ok(Some(FetchedAccount {
        slot: result.context.slot,
        data: account.decode_data()?,
    }))
}
