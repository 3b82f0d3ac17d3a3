use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::storage::{SeriesQuery, StorageBackend, StorageResult, normalize_user_id};
use crate::{AlertRule, Batch, Sample, UserId};

use super::rules::RuleCache;

/// A breached rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub user_id: UserId,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: i64,
}

impl AlertEvent {
    fn new(rule: &AlertRule, user_id: UserId, sample: Sample) -> Self {
        Self {
            user_id,
            metric: rule.metric_name.clone(),
            value: sample.value,
            threshold: rule.threshold,
            timestamp: sample.timestamp,
        }
    }

    fn log(&self) {
        warn!(
            user_id = self.user_id,
            metric = %self.metric,
            value = self.value,
            threshold = self.threshold,
            timestamp = self.timestamp,
            "ALERT FIRED: {} = {} exceeds threshold {}",
            self.metric,
            self.value,
            self.threshold
        );
    }
}

/// Evaluates samples against the cached rules
#[derive(Debug, Clone)]
pub struct AlertEngine {
    cache: RuleCache,
    default_user_id: UserId,
}

impl AlertEngine {
    pub fn new(cache: RuleCache) -> Self {
        Self {
            cache,
            default_user_id: crate::storage::DEFAULT_USER_ID,
        }
    }

    /// Tenant whose rules apply to batches arriving with user id `0`
    pub fn with_default_user(mut self, default_user_id: UserId) -> Self {
        self.default_user_id = default_user_id;
        self
    }

    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    /// Check every sample of `batch` against its owner's rules.
    ///
    /// Silence is the normal outcome: only breaches are returned and logged.
    pub async fn evaluate(&self, batch: &Batch) -> Vec<AlertEvent> {
        let user_id = normalize_user_id(batch.user_id, self.default_user_id);
        let rules = self.cache.rules_for(user_id).await;
        if rules.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        for series in &batch.series {
            for rule in rules.iter().filter(|r| r.metric_name == series.metric.name) {
                for sample in &series.samples {
                    if rule.is_breached_by(sample.value) {
                        let event = AlertEvent::new(rule, user_id, *sample);
                        event.log();
                        events.push(event);
                    }
                }
            }
        }
        events
    }

    /// Polling variant: compare each rule against the newest stored sample.
    ///
    /// Breaches are logged as alerts and returned; rules that hold are logged
    /// at debug level. Rules whose metric has no data are skipped.
    pub async fn poll(&self, store: &dyn StorageBackend) -> StorageResult<Vec<AlertEvent>> {
        let snapshot = self.cache.snapshot().await;
        let mut latest: HashMap<(UserId, &str), Option<Sample>> = HashMap::new();
        let mut events = Vec::new();

        for (user_id, rules) in snapshot.iter() {
            for rule in rules {
                let key = (*user_id, rule.metric_name.as_str());
                let sample = match latest.get(&key) {
                    Some(sample) => *sample,
                    None => {
                        let series = store
                            .query(SeriesQuery::for_user(*user_id).metric(rule.metric_name.clone()))
                            .await?;
                        let sample = series
                            .first()
                            .and_then(|s| s.samples.last().copied());
                        latest.insert(key, sample);
                        sample
                    }
                };

                let Some(sample) = sample else {
                    continue;
                };

                if rule.is_breached_by(sample.value) {
                    let event = AlertEvent::new(rule, *user_id, sample);
                    event.log();
                    events.push(event);
                } else {
                    debug!(
                        user_id = *user_id,
                        metric = %rule.metric_name,
                        value = sample.value,
                        threshold = rule.threshold,
                        "rule ok"
                    );
                }
            }
        }

        Ok(events)
    }
}
