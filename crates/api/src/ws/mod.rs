//! WebSocket infrastructure for real-time job and queue updates.
//!
//! Provides connection management, heartbeat monitoring, the HTTP upgrade
//! handler, and the relay task that forwards event-bus traffic to every
//! connected client.

mod handler;
mod heartbeat;
pub mod manager;
mod relay;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
pub use relay::start_relay;

/// Server → client message types.
pub const MSG_TYPE_CONNECTED: &str = "CONNECTED";
pub const MSG_TYPE_PONG: &str = "PONG";
pub const MSG_TYPE_JOB_STATUS_UPDATE: &str = "JOB_STATUS_UPDATE";
pub const MSG_TYPE_QUEUE_UPDATE: &str = "QUEUE_UPDATE";

/// Client → server message types.
pub const MSG_TYPE_PING: &str = "PING";
