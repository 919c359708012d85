//! JSON-RPC messages exchanged with the ledger's WebSocket feed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};

use super::FeedError;
use crate::accounts::Address;

/// What a subscription watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionTarget {
    /// A single account (`accountSubscribe`).
    Account(Address),
    /// Every account owned by a program (`programSubscribe`).
    Program(Address),
}

impl SubscriptionTarget {
    pub fn address(&self) -> &Address {
        match self {
            SubscriptionTarget::Account(a) | SubscriptionTarget::Program(a) => a,
        }
    }

    fn subscribe_method(&self) -> &'static str {
        match self {
            SubscriptionTarget::Account(_) => "accountSubscribe",
            SubscriptionTarget::Program(_) => "programSubscribe",
        }
    }

    fn unsubscribe_method(&self) -> &'static str {
        match self {
            SubscriptionTarget::Account(_) => "accountUnsubscribe",
            SubscriptionTarget::Program(_) => "programUnsubscribe",
        }
    }
}

impl std::fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionTarget::Account(a) => write!(f, "account:{a}"),
            SubscriptionTarget::Program(a) => write!(f, "program:{a}"),
        }
    }
}

pub fn subscribe_request(request_id: u64, target: &SubscriptionTarget, commitment: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": target.subscribe_method(),
        "params": [
            target.address().to_string(),
            {"encoding": "base64", "commitment": commitment}
        ]
    })
    .to_string()
}

pub fn unsubscribe_request(
    request_id: u64,
    target: &SubscriptionTarget,
    subscription_id: u64,
) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": target.unsubscribe_method(),
        "params": [subscription_id]
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Account change delivered for a subscription id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNotification {
    pub subscription_id: u64,
    pub slot: u64,
    /// Present for program-wide notifications; single-account
    /// notifications are resolved through the subscription.
    pub pubkey: Option<Address>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Response {
        request_id: u64,
        result: Result<Value, RpcError>,
    },
    Notification(AccountNotification),
    /// Anything else the feed sends; ignored.
    Other,
}

#[derive(Deserialize)]
struct RawMessage {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcError>,
    method: Option<String>,
    params: Option<Value>,
}

#[derive(Deserialize)]
struct NotificationParams {
    subscription: u64,
    result: NotificationResult,
}

#[derive(Deserialize)]
struct NotificationResult {
    context: Context,
    value: Value,
}

#[derive(Deserialize)]
pub(crate) struct Context {
    pub slot: u64,
}

/// `{"data": ["<base64>", "base64"], ...}`
#[derive(Deserialize)]
pub(crate) struct UiAccount {
    pub data: (String, String),
}

#[derive(Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: UiAccount,
}

impl UiAccount {
    pub fn decode_data(&self) -> Result<Vec<u8>, FeedError> {
        let (payload, encoding) = &self.data;
        if encoding != "base64" {
            return Err(FeedError::Protocol(format!(
                "unexpected account encoding {encoding}"
            )));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| FeedError::Protocol(format!("invalid base64 account data: {e}")))
    }
}

pub fn parse_message(text: &str) -> Result<FeedMessage, FeedError> {
    let raw: RawMessage = serde_json::from_str(text)?;

    if let Some(request_id) = raw.id {
        let result = match (raw.result, raw.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Ok(Value::Null),
        };
        return Ok(FeedMessage::Response { request_id, result });
    }

    let (Some(method), Some(params)) = (raw.method, raw.params) else {
        return Ok(FeedMessage::Other);
    };
    if method != "accountNotification" && method != "programNotification" {
        return Ok(FeedMessage::Other);
    }
    let params: NotificationParams = serde_json::from_value(params)?;
    let slot = params.result.context.slot;
    let (pubkey, account) = match method.as_str() {
        "accountNotification" => {
            let account: UiAccount = serde_json::from_value(params.result.value)?;
            (None, account)
        }
        "programNotification" => {
            let keyed: KeyedAccount = serde_json::from_value(params.result.value)?;
            let pubkey = keyed
                .pubkey
                .parse::<Address>()
                .map_err(|e| FeedError::Protocol(e.to_string()))?;
            (Some(pubkey), keyed.account)
        }
        _ => return Ok(FeedMessage::Other),
    };

    Ok(FeedMessage::Notification(AccountNotification {
        subscription_id: params.subscription,
        slot,
        pubkey,
        data: account.decode_data()?,
    }))
}
