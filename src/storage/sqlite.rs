//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers see committed data only, never a half-written batch
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Idempotent schema bootstrap with sqlx
//!
//! Every `append_batch` runs in a single transaction. A failing insert drops
//! the transaction, which rolls back every row written before it.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::util::generate_api_key;
use crate::{AlertRule, Batch, TimeSeries, UserId};

use super::backend::{HealthStatus, NewUser, SeriesQuery, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::normalize_user_id;
use super::schema::{SampleRow, group_rows};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
    default_user_id: UserId,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent readers (WAL mode)
    ///
    /// ## Arguments
    ///
    /// * `db_path` - Path to the SQLite database file (e.g., "./metricat.db")
    /// * `default_user_id` - Tenant that receives batches and queries with user id `0`
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>, default_user_id: UserId) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
            default_user_id,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, batch), fields(user_id = batch.user_id, count = batch.sample_count()))]
    async fn append_batch(&self, batch: &Batch) -> StorageResult<usize> {
        let user_id = normalize_user_id(batch.user_id, self.default_user_id);
        let rows = SampleRow::from_batch(batch, user_id);

        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO samples (user_id, metric_name, timestamp, value) VALUES (?, ?, ?, ?)",
            )
            .bind(row.user_id)
            .bind(&row.metric_name)
            .bind(row.timestamp)
            .bind(row.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("batch insert complete ({} samples)", rows.len());
        Ok(rows.len())
    }

    #[instrument(skip(self), fields(user_id = query.user_id))]
    async fn query(&self, query: SeriesQuery) -> StorageResult<Vec<TimeSeries>> {
        let user_id = normalize_user_id(query.user_id, self.default_user_id);

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT metric_name, timestamp, value FROM samples WHERE user_id = ");
        builder.push_bind(user_id);

        if let Some(name) = query.name_filter() {
            builder.push(" AND metric_name = ").push_bind(name.to_string());
        }
        if let Some(start) = query.start {
            builder.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = query.end {
            builder.push(" AND timestamp <= ").push_bind(end);
        }
        builder.push(" ORDER BY metric_name ASC, timestamp ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let rows = rows
            .into_iter()
            .map(|row| {
                Ok(SampleRow {
                    user_id,
                    metric_name: row.try_get("metric_name")?,
                    timestamp: row.try_get("timestamp")?,
                    value: row.try_get::<Option<f64>, _>("value")?.unwrap_or(f64::NAN),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        debug!("query returned {} samples", rows.len());
        Ok(group_rows(rows))
    }

    async fn verify_key(&self, api_key: &str) -> StorageResult<Option<UserId>> {
        if api_key.is_empty() {
            return Ok(None);
        }

        let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user_id)
    }

    #[instrument(skip(self))]
    async fn create_user(&self, email: &str) -> StorageResult<NewUser> {
        let api_key = generate_api_key();

        let result = sqlx::query("INSERT INTO users (email, api_key) VALUES (?, ?)")
            .bind(email)
            .bind(&api_key)
            .execute(&self.pool)
            .await?;

        let user_id = result.last_insert_rowid();
        info!("created new user {user_id}");

        Ok(NewUser { user_id, api_key })
    }

    async fn create_alert_rule(&self, rule: AlertRule) -> StorageResult<i64> {
        let result =
            sqlx::query("INSERT INTO alert_rules (user_id, metric_name, threshold) VALUES (?, ?, ?)")
                .bind(rule.user_id)
                .bind(&rule.metric_name)
                .bind(rule.threshold)
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_alert_rules(&self, user_id: Option<UserId>) -> StorageResult<Vec<AlertRule>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT user_id, metric_name, threshold FROM alert_rules");
        if let Some(user_id) = user_id {
            builder.push(" WHERE user_id = ").push_bind(user_id);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;

        let rules = rows
            .into_iter()
            .map(|row| {
                Ok(AlertRule {
                    user_id: row.try_get("user_id")?,
                    metric_name: row.try_get("metric_name")?,
                    threshold: row.try_get("threshold")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(rules)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
