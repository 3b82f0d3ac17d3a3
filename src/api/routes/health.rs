//! Health check endpoint

use axum::{Json, extract::State};
use tracing::instrument;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Reports `ok` when the store answers its own health check, `degraded` otherwise.
#[instrument(skip_all)]
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, storage) = match state.store.health_check().await {
        Ok(health) if health.healthy => ("ok", health.message),
        Ok(health) => ("degraded", health.message),
        Err(e) => ("degraded", e.to_string()),
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
    })
}
