//! Message types for actor communication
//!
//! Every actor is driven by an mpsc command channel. Requests that need an
//! answer carry a oneshot `respond_to` sender.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

/// Commands that can be sent to the StorageActor
#[derive(Debug)]
pub enum StorageCommand {
    /// Get storage worker statistics
    GetStats {
        respond_to: oneshot::Sender<StorageStats>,
    },

    /// Stop consuming; messages still queued on the bus are left behind
    Shutdown,
}

/// Counters of the storage worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub batches_persisted: u64,
    pub samples_persisted: u64,

    /// Payloads that failed to decode and were dropped
    pub decode_failures: u64,

    /// Batches the backend refused
    pub write_failures: u64,
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Refresh the rule cache immediately, returning the number of rules cached
    RefreshNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    GetStats {
        respond_to: oneshot::Sender<AlertStats>,
    },

    Shutdown,
}

/// Counters of the alert worker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertStats {
    pub rules_cached: usize,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub batches_evaluated: u64,
    pub decode_failures: u64,
    pub alerts_fired: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Commands that can be sent to a ScraperActor
#[derive(Debug)]
pub enum ScraperCommand {
    /// Trigger an immediate poll (bypassing the interval timer)
    ///
    /// Answers with the number of samples published.
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    /// Gracefully shut down the scraper
    Shutdown,
}
