//! Request and response bodies of the HTTP API

use serde::{Deserialize, Serialize};

use crate::actors::messages::{AlertStats, StorageStats};
use crate::{TimeSeries, UserId};

/// Body of POST /api/register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
}

/// Response for POST /api/register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub api_key: String,
    pub user_id: UserId,
}

/// Body of POST /api/rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRequest {
    pub metric: String,
    pub threshold: f64,
}

/// Query string of GET /api/metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsQuery {
    /// Only return the series with this name
    pub name: Option<String>,
}

/// One point of a series in GET /api/metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub t: i64,
    #[serde(with = "crate::util::float_repr")]
    pub v: f64,
}

/// One series in GET /api/metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub name: String,
    pub samples: Vec<SamplePoint>,
}

impl From<TimeSeries> for SeriesResponse {
    fn from(series: TimeSeries) -> Self {
        Self {
            name: series.metric.name,
            samples: series
                .samples
                .into_iter()
                .map(|s| SamplePoint {
                    t: s.timestamp,
                    v: s.value,
                })
                .collect(),
        }
    }
}

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
}

/// Response for GET /api/v1/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<AlertStats>,
}
