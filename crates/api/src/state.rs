use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::WorkerPool;
use crate::storage::ArtifactStore;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: gifpress_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// On-disk artifact store (uploads and outputs).
    pub store: Arc<ArtifactStore>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for job and queue events.
    pub event_bus: Arc<gifpress_events::EventBus>,
    /// Bounded worker pool executing compression jobs.
    pub worker_pool: Arc<WorkerPool>,
}
