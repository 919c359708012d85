//! WebSocket client for the `GET /stream` endpoint.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::{Topic, WsClientMessage, WsServerMessage};

/// A live subscription to the broadcast stream.
///
/// ```no_run
/// # async fn demo() -> Result<(), plp_sync_sdk::client::ClientError> {
/// use plp_sync_sdk::client::StreamClient;
/// use plp_sync_sdk::objects::Topic;
///
/// let url = url::Url::parse("ws://localhost:8080/stream")?;
/// let mut client = StreamClient::connect(&url).await?;
/// client.subscribe(vec![Topic::All]).await?;
/// while let Some(msg) = client.next_message().await? {
///     println!("{msg:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl StreamClient {
    /// Open a WebSocket connection to `url` (the full `/stream` URL).
    pub async fn connect(url: &Url) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url.as_str()).await?;
        Ok(Self { ws })
    }

    pub async fn subscribe(&mut self, topics: Vec<Topic>) -> Result<(), ClientError> {
        self.send(&WsClientMessage::Subscribe { topics }).await
    }

    pub async fn unsubscribe(&mut self, topics: Vec<Topic>) -> Result<(), ClientError> {
        self.send(&WsClientMessage::Unsubscribe { topics }).await
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send(&WsClientMessage::Ping).await
    }

    /// Wait for the next server message.
    ///
    /// Control frames are handled transparently. Returns `Ok(None)` once
    /// the server closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<WsServerMessage>, ClientError> {
        while let Some(frame) = self.ws.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
                Message::Binary(bytes) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                Message::Ping(payload) => self.ws.send(Message::Pong(payload)).await?,
                Message::Close(_) => return Ok(None),
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    /// Send a close frame and wait for the connection to shut down.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn send(&mut self, msg: &WsClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(msg)?;
        self.ws.send(Message::Text(json)).await?;
        Ok(())
    }
}
