//! Series query endpoint

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use tracing::instrument;

use crate::api::{
    error::ApiResult,
    middleware::auth::AuthenticatedUser,
    state::ApiState,
    types::{MetricsQuery, SeriesResponse},
    utils::with_store_timeout,
};
use crate::storage::SeriesQuery;

/// GET /api/metrics?name=<metric>
///
/// Every series of the caller, or only `name`, samples ascending by time.
/// Unknown names yield an empty list.
#[instrument(skip_all, fields(user_id = user_id, name = ?params.name))]
pub async fn get_metrics(
    State(state): State<ApiState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Query(params): Query<MetricsQuery>,
) -> ApiResult<Json<Vec<SeriesResponse>>> {
    let mut query = SeriesQuery::for_user(user_id);
    if let Some(name) = params.name {
        query = query.metric(name);
    }

    let series = with_store_timeout(state.store.query(query)).await?;

    Ok(Json(series.into_iter().map(SeriesResponse::from).collect()))
}
