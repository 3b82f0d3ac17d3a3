//! Ingestion endpoint

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::instrument;

use crate::api::{error::ApiResult, middleware::auth::AuthenticatedUser, state::ApiState};
use crate::gateway::IngestRequest;

/// POST /api/ingest
///
/// Hands one sample to the gateway. `202` means the batch was published on
/// the bus, not that it has been stored yet.
#[instrument(skip_all, fields(user_id = user_id))]
pub async fn ingest(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, &'static str)> {
    let Json(request) = payload?;
    state.gateway.admit(user_id, request).await?;
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
