//! Shared helpers for route handlers

use std::future::Future;
use std::time::Duration;

use crate::storage::StorageResult;

use super::error::{ApiError, ApiResult};

/// Bound on store calls made directly by route handlers
pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a store call under [`STORE_TIMEOUT`], mapping an overrun to `Unavailable`.
pub async fn with_store_timeout<T>(call: impl Future<Output = StorageResult<T>>) -> ApiResult<T> {
    match tokio::time::timeout(STORE_TIMEOUT, call).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::Unavailable("storage did not answer in time".to_string())),
    }
}
