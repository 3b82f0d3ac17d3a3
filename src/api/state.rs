//! API shared state

use std::sync::Arc;

use crate::actors::{AlertHandle, StorageHandle};
use crate::gateway::Gateway;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Store for registration, rule management and queries
    pub store: Arc<dyn StorageBackend>,

    /// Ingestion gateway, also used to authenticate every keyed route
    pub gateway: Gateway,

    /// Storage worker, for statistics
    pub storage_worker: Option<StorageHandle>,

    /// Alert worker, for statistics
    pub alert_worker: Option<AlertHandle>,
}

impl ApiState {
    pub fn new(store: Arc<dyn StorageBackend>, gateway: Gateway) -> Self {
        Self {
            store,
            gateway,
            storage_worker: None,
            alert_worker: None,
        }
    }

    pub fn with_workers(mut self, storage: StorageHandle, alerts: AlertHandle) -> Self {
        self.storage_worker = Some(storage);
        self.alert_worker = Some(alerts);
        self
    }
}
