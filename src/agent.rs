//! Building blocks of the local agent
//!
//! [`SystemSampler`] turns the host's gauges into single-sample series;
//! [`IngestClient`] pushes samples to the gateway's ingest endpoint one
//! request per gauge.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use sysinfo::{Disks, Networks, System};
use tracing::{trace, warn};

use crate::gateway::IngestRequest;
use crate::{Metric, Sample, TimeSeries};

/// Timeout of a single push
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

const API_KEY_HEADER: &str = "X-API-Key";

const BYTES_PER_GB: f64 = 1e9;

/// Samples CPU, memory, disk, load and network gauges
pub struct SystemSampler {
    sys: System,
    disks: Disks,
    networks: Networks,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        // prime the CPU counters, usage is computed between two refreshes
        sys.refresh_cpu_usage();

        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Refresh every source and return one series per gauge, stamped `now`
    pub fn sample(&mut self, now: i64) -> Vec<TimeSeries> {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let mut gauges: Vec<(&str, f64)> = Vec::new();

        gauges.push(("system_cpu_percent", self.sys.global_cpu_usage() as f64));

        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        if total > 0.0 {
            gauges.push(("system_mem_percent", used / total * 100.0));
        }
        gauges.push(("system_mem_used_gb", used / BYTES_PER_GB));
        gauges.push(("system_mem_total_gb", total / BYTES_PER_GB));

        if let Some(root) = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
        {
            let total = root.total_space() as f64;
            let free = root.available_space() as f64;
            if total > 0.0 {
                gauges.push(("system_disk_percent", (total - free) / total * 100.0));
            }
            gauges.push(("system_disk_free_gb", free / BYTES_PER_GB));
        }

        let load = System::load_average();
        gauges.push(("system_load_1", load.one));
        gauges.push(("system_load_5", load.five));
        gauges.push(("system_load_15", load.fifteen));

        let (sent, received) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(sent, received), (_, data)| {
                (sent + data.total_transmitted(), received + data.total_received())
            });
        gauges.push(("system_net_sent_bytes", sent as f64));
        gauges.push(("system_net_recv_bytes", received as f64));

        gauges
            .into_iter()
            .map(|(name, value)| TimeSeries::single(Metric::new(name), Sample::new(now, value)))
            .collect()
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Client of the gateway's ingest endpoint
#[derive(Clone)]
pub struct IngestClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl IngestClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    /// Push one sample; anything but `202 Accepted` is an error
    pub async fn push(&self, request: &IngestRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .context("upload failed")?;

        if response.status() != StatusCode::ACCEPTED {
            anyhow::bail!("server rejected {}: {}", request.name, response.status());
        }

        trace!("pushed {}", request.name);
        Ok(())
    }

    /// Push the first sample of every series, logging rejections.
    ///
    /// Returns how many were accepted.
    pub async fn push_all(&self, series: &[TimeSeries]) -> usize {
        let mut accepted = 0;
        for s in series {
            let Some(sample) = s.samples.first() else {
                continue;
            };
            let request = IngestRequest::new(s.metric.name.clone(), sample.value, sample.timestamp);
            match self.push(&request).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!("{e:#}"),
            }
        }
        accepted
    }
}
