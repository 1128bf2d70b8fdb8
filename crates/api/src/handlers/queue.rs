//! Worker-pool configuration endpoints.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response for GET/PUT /api/queue/config.
#[derive(Debug, Serialize)]
pub struct QueueConfigResponse {
    pub concurrency: usize,
    pub active: usize,
    pub pending: usize,
    pub max_concurrency: usize,
}

/// Request body for PUT /api/queue/config.
#[derive(Debug, Deserialize)]
pub struct SetQueueConfig {
    pub concurrency: usize,
}

/// GET /api/queue/config
///
/// Current pool gauges: `active` = executing now, `pending` = admitted but
/// not yet started.
pub async fn get_config(State(state): State<AppState>) -> AppResult<Json<QueueConfigResponse>> {
    let status = state.worker_pool.status();
    Ok(Json(QueueConfigResponse {
        concurrency: status.concurrency,
        active: status.active,
        pending: status.pending,
        max_concurrency: state.worker_pool.max_concurrency(),
    }))
}

/// PUT /api/queue/config
///
/// Adjust the worker count. In-flight jobs are never cancelled; shrinking
/// takes effect as running jobs drain.
pub async fn set_config(
    State(state): State<AppState>,
    Json(input): Json<SetQueueConfig>,
) -> AppResult<Json<QueueConfigResponse>> {
    let max = state.worker_pool.max_concurrency();
    if input.concurrency < 1 || input.concurrency > max {
        return Err(AppError::BadRequest(format!(
            "concurrency must be between 1 and {max}"
        )));
    }

    let status = state.worker_pool.set_concurrency(input.concurrency);
    tracing::info!(concurrency = input.concurrency, "Worker concurrency updated");

    Ok(Json(QueueConfigResponse {
        concurrency: status.concurrency,
        active: status.active,
        pending: status.pending,
        max_concurrency: max,
    }))
}
