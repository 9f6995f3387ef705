//! WebSocket infrastructure for real-time delivery.
//!
//! Provides connection and room management, heartbeat pings, and the HTTP
//! upgrade handler. [`WsManager`] is the process's [`RealtimeTransport`].
//!
//! [`RealtimeTransport`]: coursecast_events::RealtimeTransport

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{ws_handler, ClientMessage};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
