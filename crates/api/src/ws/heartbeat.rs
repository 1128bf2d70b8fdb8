use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// A connection silent for this long is considered dead and closed. The
/// client reconnects and reconciles over REST.
const STALE_AFTER_SECS: u64 = 90;

/// Spawn a background task that sends periodic Ping frames to all connected
/// WebSocket clients and closes connections that stopped answering.
///
/// The returned `JoinHandle` can be used to abort the task during shutdown.
pub fn start_heartbeat(ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            interval.tick().await;
            let closed = ws_manager
                .close_stale(Duration::from_secs(STALE_AFTER_SECS))
                .await;
            if closed > 0 {
                tracing::info!(closed, "WebSocket heartbeat closed stale connections");
            }
            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
