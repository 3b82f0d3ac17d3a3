//! API key authentication middleware
//!
//! Resolves the `X-API-Key` header to a user before the handler runs, so
//! an unauthenticated request is rejected without its body ever being read.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::UserId;
use crate::api::{error::ApiError, state::ApiState};

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Identity of the caller, inserted as a request extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// Authentication middleware
///
/// Looks the key up through the gateway (bounded by its auth timeout).
pub async fn require_api_key(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let user_id = state.gateway.authenticate(&api_key).await?;
    debug!("authenticated user {user_id}");

    request.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(request).await)
}
