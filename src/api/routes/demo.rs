//! Simulated exposition feed

use axum::{http::header, response::IntoResponse};
use rand::Rng;
use tracing::instrument;

use crate::exposition::render_exposition;
use crate::util::unix_now;
use crate::{Metric, Sample, TimeSeries};

/// GET /metrics/demo
///
/// A small feed with one randomly valued gauge, for pointing a scraper at.
#[instrument]
pub async fn demo_feed() -> impl IntoResponse {
    let now = unix_now();
    let cpu: f64 = rand::rng().random_range(0.0..100.0);

    let series = [
        TimeSeries::single(Metric::new("platform_cpu"), Sample::new(now, cpu)),
        TimeSeries::single(Metric::new("platform_up"), Sample::new(now, 1.0)),
        TimeSeries::single(Metric::new("platform_workers"), Sample::new(now, 2.0)),
    ];

    let body = format!(
        "# HELP platform_cpu Simulated CPU usage in percent\n# TYPE platform_cpu gauge\n{}",
        render_exposition(&series)
    );

    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
