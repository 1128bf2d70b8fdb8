//! Liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/health
///
/// Confirms the process is up and the database answers.
pub async fn health(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    gifpress_db::health_check(&state.pool).await?;
    Ok(Json(json!({ "status": "ok" })))
}
