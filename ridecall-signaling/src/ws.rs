//! WebSocket endpoint.
//!
//! One socket per participant, JSON text frames both ways. Outbound
//! events arrive through the hub channel registered for the connection
//! and are drained by a forwarding task; inbound frames are decoded and
//! dispatched on the connection's own task.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use ridecall_core::hub::MessageHub;
use ridecall_core::models::ParticipantId;
use ridecall_core::registry::MediaRegistry;

use crate::gateway::Gateway;
use crate::messages::ClientMessage;

/// Limit frame size to 64KB; signaling payloads are small.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub hub: Arc<MessageHub>,
    pub registry: Arc<MediaRegistry>,
}

/// `GET /ws` upgrade handler.
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // The connection id doubles as the participant id everywhere.
    let connection_id = ParticipantId::new();
    info!(connection_id = %connection_id, "WebSocket connection established");

    let mut events = state.hub.register(connection_id.clone());
    let (mut sink, mut stream) = socket.split();

    // Outbound: hub events -> socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to encode server event");
                }
            }
        }
    });

    // Inbound: socket frames -> gateway.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_message) => {
                    state.gateway.handle(&connection_id, client_message).await;
                }
                Err(err) => {
                    warn!(connection_id = %connection_id, error = %err, "undecodable frame");
                    state.gateway.reject_malformed(&connection_id);
                }
            },
            Message::Close(_) => break,
            // Binary frames and ping/pong are ignored; this protocol is
            // JSON text only.
            _ => {}
        }
    }

    state.gateway.handle_disconnect(&connection_id).await;
    send_task.abort();
    info!(connection_id = %connection_id, "WebSocket connection closed");
}
