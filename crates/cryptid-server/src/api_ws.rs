//! WebSocket subscriber transport.
//!
//! Clients connect to `GET /ws`, then subscribe to topic strings of the
//! form `sightings/<state>`. Published change messages are fanned out by
//! the [`cryptid_broker::TopicBroker`]; this module owns the per-session
//! plumbing between the broker and the socket.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-session outbound buffer. Beyond this the client is too slow and
/// published messages are dropped for it.
const SESSION_BUFFER: usize = 256;

/// Incoming WebSocket frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
}

/// Outgoing control frames. Published sighting messages are serialized by
/// the bridge and forwarded verbatim.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "error")]
    Error { message: String },
}

/// Sends a JSON-serialized error frame over the session channel.
fn send_ws_error(tx: &mpsc::Sender<String>, message: String) {
    match serde_json::to_string(&OutgoingMessage::Error { message }) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to send WebSocket error to client: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize WebSocket error message: {}", e);
        }
    }
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one WebSocket connection for its lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded channel between the broker and this socket so a slow client
    // cannot grow memory without bound.
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_BUFFER);

    let session_id = state.broker.add_session(tx.clone()).await;
    tracing::debug!(session_id = %session_id, "websocket session opened");

    // Forward broker messages to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if let AxumMessage::Text(text) = msg {
            match serde_json::from_str::<IncomingMessage>(&text) {
                Ok(IncomingMessage::Subscribe { topic }) => {
                    state.broker.subscribe(topic, session_id).await;
                }
                Ok(IncomingMessage::Unsubscribe { topic }) => {
                    state.broker.unsubscribe(&topic, session_id).await;
                }
                Err(_) => {
                    tracing::warn!(session_id = %session_id, "failed to parse incoming WebSocket message");
                    send_ws_error(&tx, "invalid message format".to_string());
                }
            }
        } else if let AxumMessage::Close(_) = msg {
            break;
        }
    }

    // Connection loss triggers unsubscription from all topics.
    state.broker.remove_session(session_id).await;
    send_task.abort();
    tracing::debug!(session_id = %session_id, "websocket session closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_subscribe_parses() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"type":"subscribe","topic":"sightings/OR"}"#)
                .expect("should parse");
        match msg {
            IncomingMessage::Subscribe { topic } => assert_eq!(topic, "sightings/OR"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn incoming_rejects_unknown_type() {
        let res = serde_json::from_str::<IncomingMessage>(r#"{"type":"shout","topic":"x"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn error_frame_shape() {
        let json = serde_json::to_value(OutgoingMessage::Error {
            message: "bad".to_string(),
        })
        .expect("should serialize");
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("error"));
        assert_eq!(json.get("message").and_then(|v| v.as_str()), Some("bad"));
    }
}
