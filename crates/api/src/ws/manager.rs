use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use coursecast_core::types::{DbId, Timestamp};
use coursecast_events::delivery::DeliveryError;
use coursecast_events::{RealtimeEvent, RealtimeTransport};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Authenticated user that opened the socket.
    pub user_id: Option<DbId>,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
    /// Rooms this connection receives events for.
    pub rooms: HashSet<String>,
}

/// Result of one [`WsManager::ping_all`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTick {
    pub pinged: usize,
    pub pruned: usize,
}

/// Manages all active WebSocket connections and their room membership.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection with no rooms.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        user_id: Option<DbId>,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            user_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
            rooms: HashSet::new(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Drop a connection. Returns how long it was open, or `None` if it was
    /// already gone.
    pub async fn remove(&self, conn_id: &str) -> Option<chrono::Duration> {
        let conn = self.connections.write().await.remove(conn_id)?;
        let open_for = chrono::Utc::now() - conn.connected_at;
        tracing::debug!(
            conn_id,
            user_id = ?conn.user_id,
            open_secs = open_for.num_seconds(),
            "WebSocket connection removed"
        );
        Some(open_for)
    }

    /// Add one connection to `room`. `false` if the connection is gone.
    pub async fn join(&self, conn_id: &str, room: &str) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.rooms.insert(room.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove one connection from `room`. `false` if it was not a member.
    pub async fn leave(&self, conn_id: &str, room: &str) -> bool {
        self.connections
            .write()
            .await
            .get_mut(conn_id)
            .is_some_and(|conn| conn.rooms.remove(room))
    }

    /// Add every connection of `user_id` to `room`. Returns how many
    /// connections were joined.
    pub async fn join_user(&self, user_id: DbId, room: &str) -> usize {
        let mut conns = self.connections.write().await;
        let mut count = 0;
        for conn in conns.values_mut() {
            if conn.user_id == Some(user_id) {
                conn.rooms.insert(room.to_string());
                count += 1;
            }
        }
        count
    }

    /// Rooms `conn_id` is currently in.
    pub async fn rooms_of(&self, conn_id: &str) -> Vec<String> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(|conn| conn.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Send `message` to every connection in any of `rooms`. A connection in
    /// several of the rooms gets it once.
    ///
    /// Connections whose send channels are closed are skipped; they are
    /// cleaned up when their receive loop ends.
    pub async fn emit_to_rooms(&self, rooms: &[String], message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if rooms.iter().any(|room| conn.rooms.contains(room))
                && conn.sender.send(message.clone()).is_ok()
            {
                count += 1;
            }
        }
        count
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    /// Ping every connection and drop the ones whose channel is closed.
    pub async fn ping_all(&self) -> HeartbeatTick {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|_, conn| conn.sender.send(Message::Ping(Bytes::new())).is_ok());
        HeartbeatTick {
            pinged: conns.len(),
            pruned: before - conns.len(),
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Events go out as `{"event": "<name>", "data": {...}}` text frames.
#[async_trait]
impl RealtimeTransport for WsManager {
    async fn emit(&self, rooms: &[String], event: &RealtimeEvent) -> Result<usize, DeliveryError> {
        let text =
            serde_json::to_string(event).map_err(|e| DeliveryError::Realtime(e.to_string()))?;
        Ok(self.emit_to_rooms(rooms, Message::Text(text.into())).await)
    }

    async fn join_user_to_room(&self, user_id: DbId, room: &str) -> Result<usize, DeliveryError> {
        Ok(self.join_user(user_id, room).await)
    }
}
