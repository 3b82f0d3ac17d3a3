//! Long-running workers of the hub
//!
//! Each actor runs as an independent tokio task, driven by an mpsc command
//! channel and, for the consumers, a queue-group subscription on the bus.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Gateway (HTTP)      Scraper-1 ... Scraper-N
//!         |                  |            |
//!         +--------+---------+------------+
//!                  | publish Batch
//!          +-------v--------+
//!          | metrics.upload |  (MessageBus subject)
//!          +---+--------+---+
//!              |        |  one copy per queue group
//!   storage-workers    alert-workers
//!              |        |
//!   +----------v--+  +--v---------+      +-----------+
//!   | StorageActor|  | AlertActor |<-----| RuleSource|  periodic refresh
//!   +------+------+  +------------+      +-----------+
//!          |
//!   StorageBackend
//! ```
//!
//! ## Actor Types
//!
//! - **ScraperActor**: Polls an exposition feed and publishes batches
//! - **StorageActor**: Appends delivered batches to the store
//! - **AlertActor**: Keeps the rule cache fresh and evaluates delivered batches
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Bus**: Batches travel between actors only through the message bus
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod alert;
pub mod messages;
pub mod scraper;
pub mod storage;

pub use alert::{AlertHandle, AlertSchedule};
pub use scraper::ScraperHandle;
pub use storage::StorageHandle;
