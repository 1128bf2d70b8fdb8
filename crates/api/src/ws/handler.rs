use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::manager::WsManager;
use crate::ws::{MSG_TYPE_CONNECTED, MSG_TYPE_PING, MSG_TYPE_PONG};

/// Inbound client message envelope. Only `PING` is defined today.
#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    message_type: String,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two tasks (sender + receiver). Job and queue events reach the
/// connection through the relay task; filtering by job id is the client's
/// responsibility.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Acknowledges with a `CONNECTED` message.
///   3. Spawns a sender task that forwards messages from the manager channel.
///   4. Processes inbound messages on the current task.
///   5. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone()).await;

    ws_manager
        .send_to(
            &conn_id,
            Message::Text(
                serde_json::json!({ "type": MSG_TYPE_CONNECTED })
                    .to_string()
                    .into(),
            ),
        )
        .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                ws_manager.record_activity(&conn_id).await;
            }
            Ok(Message::Text(text)) => {
                ws_manager.record_activity(&conn_id).await;
                handle_client_message(&ws_manager, &conn_id, &text).await;
            }
            Ok(_msg) => {
                // Binary and protocol frames carry nothing for us.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort sender task.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Dispatch one inbound JSON message.
async fn handle_client_message(ws_manager: &WsManager, conn_id: &str, text: &str) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::debug!(conn_id = %conn_id, "Ignoring malformed client message");
        return;
    };

    if message.message_type == MSG_TYPE_PING {
        ws_manager
            .send_to(
                conn_id,
                Message::Text(
                    serde_json::json!({ "type": MSG_TYPE_PONG })
                        .to_string()
                        .into(),
                ),
            )
            .await;
    }
}
