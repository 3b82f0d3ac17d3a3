//! Helper functions for integration tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metricat::{
    Metric, Sample, TimeSeries,
    actors::{AlertHandle, AlertSchedule, StorageHandle},
    alerting::{AlertEngine, RuleCache, StoreRuleSource},
    bus::{ALERT_GROUP, INGEST_SUBJECT, InProcessBus, STORAGE_GROUP},
    storage::StorageBackend,
};

/// Every worker of a hub, wired over one in-process bus
pub struct TestPipeline {
    pub store: Arc<dyn StorageBackend>,
    pub bus: Arc<InProcessBus>,
    pub storage_worker: StorageHandle,
    pub alert_worker: AlertHandle,
}

/// Schedule that never refreshes on its own within a test run
pub fn manual_schedule() -> AlertSchedule {
    AlertSchedule {
        refresh_interval: Duration::from_secs(3600),
        refresh_timeout: Duration::from_secs(1),
        poll_interval: None,
    }
}

pub async fn spawn_pipeline(store: Arc<dyn StorageBackend>) -> TestPipeline {
    let bus = Arc::new(InProcessBus::default());

    let storage_worker =
        StorageHandle::spawn(store.clone(), bus.as_ref(), INGEST_SUBJECT, STORAGE_GROUP)
            .await
            .unwrap();
    let alert_worker = AlertHandle::spawn(
        AlertEngine::new(RuleCache::new()),
        Arc::new(StoreRuleSource::new(store.clone())),
        bus.as_ref(),
        INGEST_SUBJECT,
        ALERT_GROUP,
        manual_schedule(),
        None,
    )
    .await
    .unwrap();

    TestPipeline {
        store,
        bus,
        storage_worker,
        alert_worker,
    }
}

#[cfg(feature = "api")]
pub mod hub {
    use std::net::SocketAddr;

    use metricat::{
        api::{ApiConfig, ApiState, RegisterResponse, spawn_api_server},
        gateway::Gateway,
    };

    use super::TestPipeline;

    /// Serve the HTTP API of `pipeline` on a random local port
    pub async fn spawn_api(pipeline: &TestPipeline) -> SocketAddr {
        let gateway = Gateway::new(pipeline.store.clone(), pipeline.bus.clone());
        let state = ApiState::new(pipeline.store.clone(), gateway).with_workers(
            pipeline.storage_worker.clone(),
            pipeline.alert_worker.clone(),
        );

        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            enable_cors: false,
        };

        spawn_api_server(config, state).await.unwrap()
    }

    pub async fn register(client: &reqwest::Client, addr: SocketAddr, email: &str) -> RegisterResponse {
        let response = client
            .post(format!("http://{addr}/api/register"))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        response.json().await.unwrap()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

pub fn series(name: &str, samples: &[(i64, f64)]) -> TimeSeries {
    TimeSeries::new(
        Metric::new(name),
        samples.iter().map(|&(t, v)| Sample::new(t, v)).collect(),
    )
}

pub const DEMO_FEED: &str = "# HELP platform_cpu Simulated CPU usage\n\
# TYPE platform_cpu gauge\n\
platform_cpu 42.5\n\
platform_up 1\n";
