use std::sync::Arc;

use coursecast_events::NotificationCore;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub core: Arc<NotificationCore>,
    pub ws_manager: Arc<WsManager>,
    /// Database pool for health checks. `None` when running over the
    /// in-memory store.
    pub pool: Option<coursecast_db::DbPool>,
}
