//! User registration endpoint

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::{info, instrument};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{RegisterRequest, RegisterResponse},
    utils::with_store_timeout,
};

/// POST /api/register
///
/// Creates a user and hands out its API key. A registered email is `409`.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(request) = payload?;

    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("email is required".to_string()));
    }

    let user = with_store_timeout(state.store.create_user(email)).await?;
    info!(user_id = user.user_id, "registered new user");

    Ok(Json(RegisterResponse {
        api_key: user.api_key,
        user_id: user.user_id,
    }))
}
