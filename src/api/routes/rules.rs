//! Alert rule management endpoint

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{info, instrument};

use crate::AlertRule;
use crate::api::{
    error::{ApiError, ApiResult},
    middleware::auth::AuthenticatedUser,
    state::ApiState,
    types::RuleRequest,
    utils::with_store_timeout,
};

/// POST /api/rules
///
/// The rule belongs to the authenticated caller. Alert workers pick it up on
/// their next cache refresh.
#[instrument(skip_all, fields(user_id = user_id))]
pub async fn create_rule(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    payload: Result<Json<RuleRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, &'static str)> {
    let Json(request) = payload?;

    if request.metric.trim().is_empty() {
        return Err(ApiError::BadRequest("metric is required".to_string()));
    }

    let rule = AlertRule::new(user_id, request.metric, request.threshold);
    let rule_id = with_store_timeout(state.store.create_alert_rule(rule)).await?;
    info!(user_id, rule_id, "created alert rule");

    Ok((StatusCode::CREATED, "Rule Created"))
}
