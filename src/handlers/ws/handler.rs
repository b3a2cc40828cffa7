//! WebSocket connection lifecycle
//!
//! Upgrades the connection, registers the session, runs the receive loop,
//! and tears everything down on disconnect. All protocol semantics live in
//! [`super::processor`]; this module only moves frames.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::OutgoingMessage;
use super::processor;
use crate::state::AppState;
use crate::utils::storage;

/// Outbound channel depth per connection
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Stable session identifier; generated when the client omits it
    #[serde(default)]
    pub client_id: Option<String>,
}

/// GET /ws upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = query
        .client_id
        .unwrap_or_else(|| format!("client_{}", storage::unix_millis()));
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Drive one connection to completion
async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutgoingMessage>(CHANNEL_CAPACITY);

    // All outbound traffic funnels through one writer task so handlers can
    // emit messages without sharing the sink.
    let sender_session = session_id.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("failed to serialize outgoing message: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                debug!("peer for session {sender_session} went away");
                break;
            }
        }
    });

    state.registry.connect(&session_id, tx);

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id, "receive error: {e}");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                processor::handle_text_frame(&state, &session_id, text.as_str()).await;
            }
            Message::Close(_) => {
                info!(session_id, "client closed the connection");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                debug!(session_id, "binary frame ignored; protocol is text-only");
            }
        }
    }

    state.registry.disconnect(&session_id);
    sender_task.abort();
}
