//! Websocket bridge between clients and the realtime hub
//!
//! Each connection runs two tasks: one forwards hub events to the socket,
//! the other parses client frames and applies them. Whichever ends first
//! tears down the other and unregisters the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use taskboard_realtime::{ClientEvent, ConnectionId, HubError, ServerEvent};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chat::is_room_member;
use crate::middleware::AuthUser;
use crate::AppState;

/// Upgrade to the realtime websocket
#[utoipa::path(
    get,
    path = "/api/ws",
    params(
        ("token" = Option<String>, Query, description = "Session token, for clients that cannot send headers")
    ),
    responses(
        (status = 101, description = "Switching to websocket"),
        (status = 401, description = "Not authenticated", body = crate::models::ErrorResponse)
    ),
    tag = "realtime"
)]
pub async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> impl IntoResponse {
    info!("WebSocket connection request from user {}", auth_user.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth_user.user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut events) = state.hub.connect(user_id).await;

    info!("WebSocket connected: user {} (connection {})", user_id, conn_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize realtime event: {e}");
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json.into())).await {
                debug!("WebSocket send failed for connection {conn_id}: {e}");
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let outcome = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => dispatch(&recv_state, conn_id, user_id, event).await,
                        Err(e) => Err(format!("Malformed event: {e}")),
                    };

                    if let Err(message) = outcome {
                        debug!("Rejected event on connection {conn_id}: {message}");
                        let _ = recv_state
                            .hub
                            .send_to_connection(conn_id, ServerEvent::error(message))
                            .await;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket close requested on connection {conn_id}");
                    break;
                }
                Err(e) => {
                    warn!("WebSocket receive error on connection {conn_id}: {e}");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.disconnect(conn_id).await;
    info!("WebSocket disconnected: user {} (connection {})", user_id, conn_id);
}

/// Apply one client event for `user_id` on `conn_id`.
///
/// Joining a room is checked against chatroom membership in the database;
/// everything else is handled by the hub. The error string is sent back to
/// the client as an `error` event.
pub async fn dispatch(
    state: &AppState,
    conn_id: ConnectionId,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<(), String> {
    if let ClientEvent::JoinRoom { room_id } = &event {
        let allowed = is_room_member(&state.db, *room_id, user_id)
            .await
            .map_err(|e| {
                error!("Database error while joining room {room_id}: {e}");
                "Database error".to_string()
            })?;

        if !allowed {
            return Err(format!("You are not a member of chatroom {room_id}"));
        }
    }

    state.hub.handle(conn_id, event).await.map_err(|e| match e {
        HubError::NotInRoom(room_id) => format!("Join chatroom {room_id} first"),
        other => other.to_string(),
    })
}
