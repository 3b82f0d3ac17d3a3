//! Time-series store
//!
//! This module provides a trait-based abstraction over the store that
//! persists sample batches, users, API keys and alert rules.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Batch-oriented**: `append_batch` is the only write path for samples and is atomic
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, each batch is one transaction
//! - **In-Memory**: No persistence, one reader/writer lock over the whole map
//!
//! ## Usage
//!
//! ```no_run
//! use metricat::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./metricat.db", 1).await?;
//!     // Hand to the storage actor, the gateway and the rule source
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, NewUser, SeriesQuery, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::SampleRow;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{BootstrapConfig, StorageConfig};
use crate::{AlertRule, UserId};

/// Tenant used when a batch or query arrives without an owner
pub const DEFAULT_USER_ID: UserId = 1;

/// Map the "unset" user id `0` onto the default tenant.
pub fn normalize_user_id(user_id: UserId, default_user_id: UserId) -> UserId {
    if user_id == 0 { default_user_id } else { user_id }
}

/// Open the backend named by the configuration
pub async fn open_backend(
    config: &StorageConfig,
    default_user_id: UserId,
) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, samples are lost on exit");
            Ok(Arc::new(MemoryBackend::with_default_user(default_user_id)))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("using sqlite storage at {}", path.display());
            let backend = sqlite::SqliteBackend::new(path, default_user_id).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::BackendError(
            "sqlite support is not compiled in".to_string(),
        )),
    }
}

/// Create the configured first user and its rules.
///
/// An already registered email is left untouched and yields `Ok(None)`, so
/// restarting against a persistent store is harmless.
pub async fn bootstrap(
    store: &dyn StorageBackend,
    config: &BootstrapConfig,
) -> StorageResult<Option<NewUser>> {
    let user = match store.create_user(&config.email).await {
        Ok(user) => user,
        Err(StorageError::Conflict(_)) => {
            info!("bootstrap user {} already exists, skipping", config.email);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let mut created = 0;
    for rule in &config.rules {
        if rule.metric.is_empty() {
            warn!("skipping bootstrap rule without metric");
            continue;
        }
        store
            .create_alert_rule(AlertRule::new(user.user_id, &rule.metric, rule.threshold))
            .await?;
        created += 1;
    }

    info!(
        "bootstrapped user {} (id {}) with {} rule(s), api key {}",
        config.email,
        user.user_id,
        created,
        user.api_key
    );
    Ok(Some(user))
}
