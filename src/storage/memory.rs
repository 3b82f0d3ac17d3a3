//! In-memory storage backend (no persistence)
//!
//! Everything lives behind a single `RwLock`: appends, registrations and
//! rule creation take it exclusively, lookups and queries take it shared.
//! Queries copy the matching samples out before the lock is released, so
//! callers never see the backing map change underneath them.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: No retention, samples accumulate for the process lifetime

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::util::generate_api_key;
use crate::{AlertRule, Batch, Sample, TimeSeries, UserId};

use super::backend::{HealthStatus, NewUser, SeriesQuery, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::normalize_user_id;
use super::schema::{SampleRow, group_rows};

#[derive(Debug, Default)]
struct MemoryState {
    /// Samples keyed by (owner, metric name), in arrival order
    series: HashMap<(UserId, String), Vec<Sample>>,

    /// email -> user id
    users: HashMap<String, UserId>,

    /// api key -> user id
    keys: HashMap<String, UserId>,

    rules: Vec<AlertRule>,

    next_user_id: UserId,

    next_rule_id: i64,
}

/// In-memory storage backend
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    default_user_id: UserId,
}

impl MemoryBackend {
    /// Create a new in-memory backend with default tenant `1`
    pub fn new() -> Self {
        Self::with_default_user(super::DEFAULT_USER_ID)
    }

    pub fn with_default_user(default_user_id: UserId) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_user_id: 1,
                next_rule_id: 1,
                ..Default::default()
            }),
            default_user_id,
        }
    }

    /// Total number of stored samples across all users
    pub async fn sample_count(&self) -> usize {
        let state = self.state.read().await;
        state.series.values().map(Vec::len).sum()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[instrument(skip(self, batch), fields(user_id = batch.user_id, count = batch.sample_count()))]
    async fn append_batch(&self, batch: &Batch) -> StorageResult<usize> {
        if let Some(series) = batch.series.iter().find(|s| s.metric.name.is_empty()) {
            return Err(StorageError::QueryFailed(format!(
                "series with {} samples has an empty metric name",
                series.samples.len()
            )));
        }

        let user_id = normalize_user_id(batch.user_id, self.default_user_id);
        let rows = SampleRow::from_batch(batch, user_id);
        let count = rows.len();

        let mut state = self.state.write().await;
        for row in rows {
            state
                .series
                .entry((row.user_id, row.metric_name))
                .or_default()
                .push(Sample::new(row.timestamp, row.value));
        }
        drop(state);

        debug!("stored {count} samples in memory");
        Ok(count)
    }

    #[instrument(skip(self), fields(user_id = query.user_id))]
    async fn query(&self, query: SeriesQuery) -> StorageResult<Vec<TimeSeries>> {
        let user_id = normalize_user_id(query.user_id, self.default_user_id);
        let name_filter = query.name_filter();

        let rows: Vec<SampleRow> = {
            let state = self.state.read().await;
            state
                .series
                .iter()
                .filter(|((owner, name), _)| {
                    *owner == user_id && name_filter.is_none_or(|filter| filter == name.as_str())
                })
                .flat_map(|((owner, name), samples)| {
                    samples
                        .iter()
                        .filter(|s| query.matches_time(s.timestamp))
                        .map(|s| SampleRow {
                            user_id: *owner,
                            metric_name: name.clone(),
                            timestamp: s.timestamp,
                            value: s.value,
                        })
                })
                .collect()
        };

        Ok(group_rows(rows))
    }

    async fn verify_key(&self, api_key: &str) -> StorageResult<Option<UserId>> {
        if api_key.is_empty() {
            return Ok(None);
        }
        let state = self.state.read().await;
        Ok(state.keys.get(api_key).copied())
    }

    #[instrument(skip(self))]
    async fn create_user(&self, email: &str) -> StorageResult<NewUser> {
        let mut state = self.state.write().await;

        if state.users.contains_key(email) {
            return Err(StorageError::Conflict(format!(
                "email already registered: {email}"
            )));
        }

        let api_key = generate_api_key();
        if state.keys.contains_key(&api_key) {
            return Err(StorageError::Conflict("generated api key collided".to_string()));
        }

        let user_id = state.next_user_id;
        state.next_user_id += 1;
        state.users.insert(email.to_string(), user_id);
        state.keys.insert(api_key.clone(), user_id);

        debug!("created user {user_id}");
        Ok(NewUser { user_id, api_key })
    }

    async fn create_alert_rule(&self, rule: AlertRule) -> StorageResult<i64> {
        let mut state = self.state.write().await;
        let rule_id = state.next_rule_id;
        state.next_rule_id += 1;
        state.rules.push(rule);
        Ok(rule_id)
    }

    async fn get_alert_rules(&self, user_id: Option<UserId>) -> StorageResult<Vec<AlertRule>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .iter()
            .filter(|rule| user_id.is_none_or(|uid| rule.user_id == uid))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        let total: usize = state.series.values().map(Vec::len).sum();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_samples".to_string(), total.to_string()),
                ("users".to_string(), state.users.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
