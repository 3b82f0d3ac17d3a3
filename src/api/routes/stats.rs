//! Worker statistics endpoint

use axum::{Json, extract::State};
use tracing::instrument;

use crate::api::{state::ApiState, types::StatsResponse};

/// GET /api/v1/stats
///
/// Counters of the storage and alert workers, when the hub runs them.
#[instrument(skip_all)]
pub async fn get_stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let storage = match &state.storage_worker {
        Some(handle) => handle.get_stats().await,
        None => None,
    };
    let alerts = match &state.alert_worker {
        Some(handle) => handle.get_stats().await,
        None => None,
    };

    Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
        alerts,
    })
}
