//! Integration tests for the full ingest pipeline
//!
//! These tests verify that components work correctly together:
//! - HTTP ingest -> bus -> storage worker -> query
//! - HTTP ingest -> bus -> alert worker with rules from the store
//! - Scraper -> bus -> storage worker

use std::sync::Arc;

use metricat::{
    Batch,
    actors::ScraperHandle,
    bus::{INGEST_SUBJECT, MessageBus, codec},
    config::ScraperConfig,
    storage::{MemoryBackend, SeriesQuery, StorageBackend},
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[cfg(feature = "api")]
#[tokio::test]
async fn test_ingested_sample_is_stored_and_alerts() {
    use metricat::api::{SeriesResponse, types::SamplePoint};

    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();

    let user = hub::register(&client, addr, "alice@example.com").await;
    let user_id = user.user_id;

    let response = client
        .post(format!("http://{addr}/api/rules"))
        .header("X-API-Key", &user.api_key)
        .json(&serde_json::json!({ "metric": "cpu", "threshold": 90.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert_eq!(response.text().await.unwrap(), "Rule Created");

    // rules reach the workers on refresh
    assert_eq!(pipeline.alert_worker.refresh_now().await.unwrap(), 1);

    let response = client
        .post(format!("http://{addr}/api/ingest"))
        .header("X-API-Key", &user.api_key)
        .json(&serde_json::json!({ "name": "cpu", "value": 95.0, "timestamp": 1_700_000_000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let store = pipeline.store.clone();
    assert!(
        wait_until(|| {
            let store = store.clone();
            async move {
                !store
                    .query(SeriesQuery::for_user(user_id))
                    .await
                    .unwrap()
                    .is_empty()
            }
        })
        .await
    );

    let series: Vec<SeriesResponse> = client
        .get(format!("http://{addr}/api/metrics?name=cpu"))
        .header("X-API-Key", &user.api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        series,
        vec![SeriesResponse {
            name: "cpu".to_string(),
            samples: vec![SamplePoint {
                t: 1_700_000_000,
                v: 95.0
            }],
        }]
    );

    let alert_worker = pipeline.alert_worker.clone();
    assert!(
        wait_until(|| {
            let alert_worker = alert_worker.clone();
            async move {
                alert_worker
                    .get_stats()
                    .await
                    .is_some_and(|stats| stats.alerts_fired == 1)
            }
        })
        .await
    );
}

#[tokio::test]
async fn test_batch_reaches_both_groups_once() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let batch = Batch::new(1, vec![series("mem", &[(1, 10.0), (2, 20.0)])]);

    let payload = codec::encode_batch(&batch).unwrap();
    pipeline.bus.publish(INGEST_SUBJECT, payload).await.unwrap();
    assert_eq!(pipeline.bus.stats().await.delivered, 2);

    let storage_worker = pipeline.storage_worker.clone();
    assert!(
        wait_until(|| {
            let storage_worker = storage_worker.clone();
            async move {
                storage_worker
                    .get_stats()
                    .await
                    .is_some_and(|stats| stats.samples_persisted == 2)
            }
        })
        .await
    );

    let alert_worker = pipeline.alert_worker.clone();
    assert!(
        wait_until(|| {
            let alert_worker = alert_worker.clone();
            async move {
                alert_worker
                    .get_stats()
                    .await
                    .is_some_and(|stats| stats.batches_evaluated == 1)
            }
        })
        .await
    );
    assert_eq!(pipeline.alert_worker.get_stats().await.unwrap().alerts_fired, 0);
}

#[tokio::test]
async fn test_scraped_feed_is_stored_for_owner() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEMO_FEED))
        .mount(&mock_server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let pipeline = spawn_pipeline(store.clone()).await;

    let target = url::Url::parse(&mock_server.uri())
        .unwrap()
        .join("/metrics")
        .unwrap();
    let mut config = ScraperConfig::new("demo", target.as_str());
    config.interval = 3600;
    config.user_id = 7;
    let scraper = ScraperHandle::spawn(config, pipeline.bus.clone(), INGEST_SUBJECT).unwrap();

    assert_eq!(scraper.poll_now().await.unwrap(), 2);

    assert!(
        wait_until(|| {
            let store = store.clone();
            async move {
                store
                    .query(SeriesQuery::for_user(7).metric("platform_cpu"))
                    .await
                    .unwrap()
                    .first()
                    .is_some_and(|s| s.samples.iter().all(|sample| sample.value == 42.5))
            }
        })
        .await
    );

    // nothing leaks to the default tenant
    assert!(store.query(SeriesQuery::for_user(1)).await.unwrap().is_empty());

    scraper.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scraped_nan_sample_does_not_drop_the_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cpu 42\nup NaN\n"))
        .mount(&mock_server)
        .await;

    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let pipeline = spawn_pipeline(store.clone()).await;

    let mut config = ScraperConfig::new("node", format!("{}/metrics", mock_server.uri()));
    config.interval = 3600;
    let scraper = ScraperHandle::spawn(config, pipeline.bus.clone(), INGEST_SUBJECT).unwrap();

    assert_eq!(scraper.poll_now().await.unwrap(), 2);

    let storage_worker = pipeline.storage_worker.clone();
    assert!(
        wait_until(|| {
            let storage_worker = storage_worker.clone();
            async move {
                storage_worker
                    .get_stats()
                    .await
                    .is_some_and(|stats| stats.samples_persisted >= 2)
            }
        })
        .await
    );
    assert_eq!(pipeline.storage_worker.get_stats().await.unwrap().decode_failures, 0);

    let cpu = store.query(SeriesQuery::for_user(1).metric("cpu")).await.unwrap();
    assert!(cpu[0].samples.iter().all(|s| s.value == 42.0));
    let up = store.query(SeriesQuery::for_user(1).metric("up")).await.unwrap();
    assert!(!up[0].samples.is_empty());
    assert!(up[0].samples.iter().all(|s| s.value.is_nan()));

    scraper.shutdown().await.unwrap();
}
