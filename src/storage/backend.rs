//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;

use crate::{AlertRule, Batch, TimeSeries, UserId};

use super::error::StorageResult;

/// Query parameters for fetching series owned by a user
#[derive(Debug, Clone, Default)]
pub struct SeriesQuery {
    /// Owning user (`0` is normalized to the default tenant)
    pub user_id: UserId,

    /// Only return the series with this exact name (`None` or empty = all series)
    pub metric_name: Option<String>,

    /// Start of time range, seconds since epoch (inclusive)
    pub start: Option<i64>,

    /// End of time range, seconds since epoch (inclusive)
    pub end: Option<i64>,
}

impl SeriesQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn metric(mut self, name: impl Into<String>) -> Self {
        self.metric_name = Some(name.into());
        self
    }

    pub fn between(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// The name filter, with an empty string treated as "no filter".
    pub fn name_filter(&self) -> Option<&str> {
        self.metric_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn matches_time(&self, timestamp: i64) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }
}

/// Credentials handed out when a user registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_id: UserId,
    pub api_key: String,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for time-series storage backends
///
/// The store owns samples, users and alert rules. Implementations must be
/// `Send + Sync`; they are shared between the bus consumer, the alert
/// engine and the HTTP handlers.
///
/// ## Consistency
///
/// - `append_batch` is all-or-nothing: either every sample of the batch
///   becomes visible to subsequent reads or none does.
/// - Query results never expose a partially applied batch.
/// - Series are keyed by metric name only; labels are not persisted.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist every sample of the batch atomically
    ///
    /// Returns the number of samples stored. A `user_id` of `0` is stored
    /// under the configured default tenant.
    async fn append_batch(&self, batch: &Batch) -> StorageResult<usize>;

    /// Fetch the user's series, one entry per distinct metric name
    ///
    /// Samples are sorted ascending by timestamp. Unknown names yield no
    /// entry rather than an error.
    async fn query(&self, query: SeriesQuery) -> StorageResult<Vec<TimeSeries>>;

    /// Resolve an API key to its owner
    ///
    /// Returns `Ok(None)` for unknown (or empty) keys. Never mutates state.
    async fn verify_key(&self, api_key: &str) -> StorageResult<Option<UserId>>;

    /// Register a user under a fresh random API key
    ///
    /// Fails with [`StorageError::Conflict`](super::StorageError::Conflict)
    /// when the email is already registered.
    async fn create_user(&self, email: &str) -> StorageResult<NewUser>;

    /// Store an alert rule and return its id
    async fn create_alert_rule(&self, rule: AlertRule) -> StorageResult<i64>;

    /// All rules, or only those of `user_id`, in unspecified order
    async fn get_alert_rules(&self, user_id: Option<UserId>) -> StorageResult<Vec<AlertRule>>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
