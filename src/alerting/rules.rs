use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, instrument};

use crate::storage::StorageBackend;
use crate::{AlertRule, UserId};

/// Where the cache gets its rules from
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Every rule of every user
    async fn fetch_rules(&self) -> anyhow::Result<Vec<AlertRule>>;
}

/// Reads rules straight from a storage backend
pub struct StoreRuleSource {
    store: Arc<dyn StorageBackend>,
}

impl StoreRuleSource {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RuleSource for StoreRuleSource {
    async fn fetch_rules(&self) -> anyhow::Result<Vec<AlertRule>> {
        Ok(self.store.get_alert_rules(None).await?)
    }
}

pub type RuleMap = HashMap<UserId, Vec<AlertRule>>;

#[derive(Debug, Default)]
struct CacheState {
    rules: Arc<RuleMap>,
    populated: bool,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Read-optimized snapshot of alert rules
///
/// Cloning is cheap and every clone sees the same snapshot. Readers take the
/// lock only long enough to clone the inner `Arc`, so a refresh never waits
/// on a long evaluation and an evaluation never sees half a refresh.
#[derive(Debug, Clone, Default)]
pub struct RuleCache {
    state: Arc<RwLock<CacheState>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh map from `rules` and swap it in.
    ///
    /// Returns the number of rules now cached.
    pub async fn replace(&self, rules: Vec<AlertRule>) -> usize {
        let count = rules.len();
        let mut map: RuleMap = HashMap::new();
        for rule in rules {
            map.entry(rule.user_id).or_default().push(rule);
        }

        let mut state = self.state.write().await;
        state.rules = Arc::new(map);
        state.populated = true;
        state.refreshed_at = Some(Utc::now());
        count
    }

    /// Fetch the full rule set from `source` and swap it in.
    ///
    /// The fetch runs without holding the lock and is bounded by `timeout`.
    /// On failure the previous snapshot stays in place and the error is
    /// returned after being logged.
    #[instrument(skip_all)]
    pub async fn refresh(&self, source: &dyn RuleSource, timeout: Duration) -> anyhow::Result<usize> {
        let fetched = tokio::time::timeout(timeout, source.fetch_rules())
            .await
            .context("rule refresh timed out")
            .and_then(|result| result.context("failed to fetch alert rules"));

        match fetched {
            Ok(rules) => {
                let count = self.replace(rules).await;
                debug!("rule cache refreshed ({count} rules)");
                Ok(count)
            }
            Err(e) => {
                error!("rule cache refresh failed, keeping previous snapshot: {e:#}");
                Err(e)
            }
        }
    }

    /// Current snapshot of the whole map
    pub async fn snapshot(&self) -> Arc<RuleMap> {
        self.state.read().await.rules.clone()
    }

    /// Rules owned by `user_id` in the current snapshot
    pub async fn rules_for(&self, user_id: UserId) -> Vec<AlertRule> {
        let snapshot = self.snapshot().await;
        snapshot.get(&user_id).cloned().unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether any refresh has ever succeeded
    pub async fn is_populated(&self) -> bool {
        self.state.read().await.populated
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }
}
