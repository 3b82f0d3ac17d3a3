//! Rule cache and alert engine
//!
//! The [`RuleCache`] holds a point-in-time snapshot of every alert rule,
//! keyed by owner. A refresher replaces the snapshot wholesale on a fixed
//! period; evaluators read it concurrently. The [`AlertEngine`] compares
//! incoming batches (or, in the polling variant, the store's latest samples)
//! against the snapshot and logs an alert for every breach.
//!
//! ## Snapshot lifecycle
//!
//! ```text
//! Empty --refresh ok--> Populated --refresh ok--> Populated ...
//!                           |
//!                      refresh failed: previous snapshot kept
//! ```

pub mod engine;
pub mod rules;

pub use engine::{AlertEngine, AlertEvent};
pub use rules::{RuleCache, RuleSource, StoreRuleSource};
