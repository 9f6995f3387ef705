use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use coursecast_core::channels::{is_client_joinable, user_room, ROOM_COURSES_CATALOG};
use coursecast_core::error::CoreError;
use coursecast_core::types::DbId;

use crate::error::AppError;
use crate::middleware::auth::authenticate;
use crate::state::AppState;
use crate::ws::manager::WsManager;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Frames a client may send.
///
/// ```json
/// {"type": "join-room", "room": "course-<id>"}
/// {"type": "leave-room", "room": "courses-catalog"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom { room: String },
    LeaveRoom { room: String },
}

/// GET /api/v1/ws?token=...
///
/// The token is validated before the upgrade; an invalid token gets a 401
/// response instead of a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, AppError> {
    let token = params.token.ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized("Missing token query parameter".into()))
    })?;
    let user = authenticate(&token, &state)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, user.user_id)))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers the connection in its user channel and the catalog room, spawns
/// a sender task that forwards channel messages to the sink, handles room
/// requests on the current task, and cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, user_id: DbId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), Some(user_id)).await;
    ws_manager.join(&conn_id, &user_room(user_id)).await;
    ws_manager.join(&conn_id, ROOM_COURSES_CATALOG).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => {
                handle_client_message(&ws_manager, &conn_id, text.as_str()).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_client_message(ws_manager: &WsManager, conn_id: &str, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Ignoring unrecognised client frame");
            return;
        }
    };

    match message {
        ClientMessage::JoinRoom { room } => {
            if !is_client_joinable(&room) {
                tracing::warn!(conn_id = %conn_id, room = %room, "Rejected join for private room");
                return;
            }
            ws_manager.join(conn_id, &room).await;
            tracing::debug!(conn_id = %conn_id, room = %room, "Joined room");
        }
        ClientMessage::LeaveRoom { room } => {
            ws_manager.leave(conn_id, &room).await;
            tracing::debug!(conn_id = %conn_id, room = %room, "Left room");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_core::channels::course_room;
    use coursecast_core::types::new_id;

    #[test]
    fn client_frames_use_kebab_case_tags() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join-room","room":"courses-catalog"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::JoinRoom {
                room: "courses-catalog".into()
            }
        );
    }

    #[tokio::test]
    async fn private_rooms_cannot_be_joined_by_clients() {
        let manager = WsManager::new();
        let _rx = manager.add("c1".into(), Some(new_id())).await;

        let other = user_room(new_id());
        let frame = format!(r#"{{"type":"join-room","room":"{other}"}}"#);
        handle_client_message(&manager, "c1", &frame).await;
        assert!(manager.rooms_of("c1").await.is_empty());

        let course = course_room(new_id());
        let frame = format!(r#"{{"type":"join-room","room":"{course}"}}"#);
        handle_client_message(&manager, "c1", &frame).await;
        assert_eq!(manager.rooms_of("c1").await, vec![course.clone()]);

        let frame = format!(r#"{{"type":"leave-room","room":"{course}"}}"#);
        handle_client_message(&manager, "c1", &frame).await;
        assert!(manager.rooms_of("c1").await.is_empty());
    }
}
