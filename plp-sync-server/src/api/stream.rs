//! `GET /stream`: consumer WebSocket.
//!
//! A connection starts with no topics. Each broadcast is delivered at most
//! once per connection, tagged with the most specific subscribed topic it
//! was published on.

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use plp_sync_core::broadcast::BroadcastHub;
use plp_sync_sdk::objects::{Topic, WsClientMessage, WsCloseCode, WsServerMessage};
use std::collections::HashSet;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

pub async fn stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_stream(socket, hub))
}

async fn handle_stream(mut socket: WebSocket, hub: BroadcastHub) {
    // subscribe before reading anything so no broadcast slips between
    // the upgrade and the first subscribe request
    let mut broadcast_rx = hub.subscribe();
    let mut topics: HashSet<Topic> = HashSet::new();
    tracing::debug!(consumers = hub.consumer_count(), "Stream consumer connected");

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(envelope) => {
                        let Some(topic) = envelope.matching_topic(&topics) else {
                            continue;
                        };
                        let msg = WsServerMessage::Update {
                            topic: topic.clone(),
                            message: envelope.message.clone(),
                        };
                        if send_json(&mut socket, &msg).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Stream consumer lagged, closing");
                        close(&mut socket, WsCloseCode::LAGGED, "consumer lagged").await;
                        return;
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<WsClientMessage>(text.as_str()) {
                            Ok(request) => apply_request(&mut topics, request),
                            Err(e) => {
                                tracing::debug!(error = %e, "Invalid stream request");
                                WsServerMessage::Error {
                                    code: WsCloseCode::INVALID_MESSAGE,
                                    reason: "invalid message".into(),
                                }
                            }
                        };
                        if send_json(&mut socket, &reply).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    Some(Ok(_)) => {
                    }
                    Some(Err(_)) => {
                        return;
                    }
                }
            }
        }
    }

    close(&mut socket, WsCloseCode::NORMAL, "server shutting down").await;
}

/// Apply a client request to the connection's topic set and build the
/// acknowledgement.
fn apply_request(topics: &mut HashSet<Topic>, request: WsClientMessage) -> WsServerMessage {
    match request {
        WsClientMessage::Subscribe { topics: requested } => {
            topics.extend(requested);
            WsServerMessage::Subscribed {
                topics: sorted(topics),
            }
        }
        WsClientMessage::Unsubscribe { topics: requested } => {
            for topic in &requested {
                topics.remove(topic);
            }
            WsServerMessage::Unsubscribed {
                topics: sorted(topics),
            }
        }
        WsClientMessage::Ping => WsServerMessage::Pong,
    }
}

fn sorted(topics: &HashSet<Topic>) -> Vec<Topic> {
    let mut list: Vec<Topic> = topics.iter().cloned().collect();
    list.sort_by_key(|t| t.to_string());
    list
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_acknowledges_full_topic_set() {
        let mut topics = HashSet::new();
        let reply = apply_request(
            &mut topics,
            WsClientMessage::Subscribe {
                topics: vec![Topic::User("Bob".into()), Topic::All],
            },
        );
        assert_eq!(
            reply,
            WsServerMessage::Subscribed {
                topics: vec![Topic::All, Topic::User("Bob".into())]
            }
        );

        let reply = apply_request(
            &mut topics,
            WsClientMessage::Subscribe {
                topics: vec![Topic::All, Topic::Market("Mkt".into())],
            },
        );
        assert_eq!(
            reply,
            WsServerMessage::Subscribed {
                topics: vec![
                    Topic::All,
                    Topic::Market("Mkt".into()),
                    Topic::User("Bob".into())
                ]
            }
        );
    }

    #[test]
    fn unsubscribe_ignores_unknown_topics() {
        let mut topics: HashSet<Topic> = [Topic::All, Topic::Market("Mkt".into())].into();
        let reply = apply_request(
            &mut topics,
            WsClientMessage::Unsubscribe {
                topics: vec![Topic::All, Topic::User("Nobody".into())],
            },
        );
        assert_eq!(
            reply,
            WsServerMessage::Unsubscribed {
                topics: vec![Topic::Market("Mkt".into())]
            }
        );
    }

    #[test]
    fn ping_gets_pong() {
        let mut topics = HashSet::new();
        assert_eq!(
            apply_request(&mut topics, WsClientMessage::Ping),
            WsServerMessage::Pong
        );
        assert!(topics.is_empty());
    }
}
