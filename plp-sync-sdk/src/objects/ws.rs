//! WebSocket message types for the `GET /stream` endpoint.
//!
//! # Protocol
//!
//! 1. The client sends [`WsClientMessage::Subscribe`] with one or more
//!    topics; the server answers with [`WsServerMessage::Subscribed`].
//! 2. The server pushes a [`WsServerMessage::Update`] for every broadcast
//!    on a subscribed topic.
//! 3. Either side may close the connection at any time. If the client
//!    falls too far behind the broadcast channel the server closes with
//!    [`WsCloseCode::LAGGED`].

use serde::{Deserialize, Serialize};

use super::broadcast::BroadcastMessage;
use super::topic::Topic;

/// Client-to-server WebSocket message.
///
/// ```json
/// {"type":"subscribe","topics":["all","market:9xQ..."]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Subscribe { topics: Vec<Topic> },
    Unsubscribe { topics: Vec<Topic> },
    Ping,
}

/// Server-to-client WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// A broadcast delivered on `topic`.
    Update {
        topic: Topic,
        message: BroadcastMessage,
    },
    /// Acknowledges a subscribe request with the full current topic set.
    Subscribed { topics: Vec<Topic> },
    /// Acknowledges an unsubscribe request with the remaining topic set.
    Unsubscribed { topics: Vec<Topic> },
    Pong,
    /// A server-side error that does **not** close the connection by
    /// itself.
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close and error codes used by the stream.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;

    pub const INTERNAL_ERROR: u16 = 1011;

    /// The client sent a frame that is not a valid [`WsClientMessage`].
    pub const INVALID_MESSAGE: u16 = 4000;

    /// The client could not keep up with the broadcast rate.
    pub const LAGGED: u16 = 4008;
}
