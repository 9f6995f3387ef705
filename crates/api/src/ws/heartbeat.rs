use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Ping every connected client each `interval` until `cancel` fires.
///
/// A ping that cannot be queued means the socket's writer task is gone, so
/// the connection is dropped from the manager on the same tick.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("WebSocket heartbeat stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let tick = ws_manager.ping_all().await;
                    if tick.pruned > 0 {
                        tracing::info!(pruned = tick.pruned, "Dropped dead WebSocket connections");
                    }
                    tracing::debug!(pinged = tick.pinged, "WebSocket heartbeat ping");
                }
            }
        }
    })
}
