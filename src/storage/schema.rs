//! Row definitions shared by the storage backends
//!
//! Batches are flattened into one [`SampleRow`] per sample on the way in and
//! regrouped into one [`TimeSeries`] per metric name on the way out. The
//! metric name is the only series key, so labels do not survive the trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Batch, Metric, Sample, TimeSeries, UserId};

/// A single persisted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub user_id: UserId,
    pub metric_name: String,
    pub timestamp: i64,
    pub value: f64,
}

impl SampleRow {
    /// Flatten a batch into rows owned by `user_id`
    ///
    /// `user_id` is passed separately so callers can apply the default
    /// tenant before flattening.
    pub fn from_batch(batch: &Batch, user_id: UserId) -> Vec<SampleRow> {
        batch
            .series
            .iter()
            .flat_map(|series| {
                series.samples.iter().map(|sample| SampleRow {
                    user_id,
                    metric_name: series.metric.name.clone(),
                    timestamp: sample.timestamp,
                    value: sample.value,
                })
            })
            .collect()
    }
}

/// Regroup rows into one series per metric name
///
/// Series come out ordered by name and samples ascending by timestamp.
/// Samples sharing a timestamp keep their insertion order.
pub fn group_rows(rows: impl IntoIterator<Item = SampleRow>) -> Vec<TimeSeries> {
    let mut grouped: BTreeMap<String, Vec<Sample>> = BTreeMap::new();

    for row in rows {
        grouped
            .entry(row.metric_name)
            .or_default()
            .push(Sample::new(row.timestamp, row.value));
    }

    grouped
        .into_iter()
        .map(|(name, mut samples)| {
            samples.sort_by_key(|s| s.timestamp);
            TimeSeries::new(Metric::new(name), samples)
        })
        .collect()
}
