pub mod actors;
pub mod agent;
pub mod alerting;
#[cfg(feature = "api")]
pub mod api;
pub mod bus;
pub mod config;
pub mod exposition;
pub mod gateway;
pub mod storage;
pub mod util;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier of a registered user (tenant).
///
/// `0` means "unset" and is normalized to the configured default tenant by the store.
pub type UserId = i64;

/// A named metric with descriptive labels.
///
/// Only the name takes part in series identity; labels are carried along as metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Metric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A single observation: seconds since epoch and a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    #[serde(with = "util::float_repr")]
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub metric: Metric,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(metric: Metric, samples: Vec<Sample>) -> Self {
        Self { metric, samples }
    }

    /// Series holding exactly one sample.
    pub fn single(metric: Metric, sample: Sample) -> Self {
        Self {
            metric,
            samples: vec![sample],
        }
    }
}

/// Unit of transfer between gateway, bus, store and alert engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub user_id: UserId,
    pub series: Vec<TimeSeries>,
}

impl Batch {
    pub fn new(user_id: UserId, series: Vec<TimeSeries>) -> Self {
        Self { user_id, series }
    }

    /// Total number of samples across every series.
    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|s| s.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }
}

/// Threshold rule owned by a user; fires when a sample of `metric_name` exceeds `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub user_id: UserId,
    pub metric_name: String,
    pub threshold: f64,
}

impl AlertRule {
    pub fn new(user_id: UserId, metric_name: impl Into<String>, threshold: f64) -> Self {
        Self {
            user_id,
            metric_name: metric_name.into(),
            threshold,
        }
    }

    /// Strict greater-than comparison; equality never breaches.
    pub fn is_breached_by(&self, value: f64) -> bool {
        value > self.threshold
    }
}
