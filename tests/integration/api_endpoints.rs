//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Keyed routes reject missing and unknown keys before touching the bus
//! - Malformed bodies and duplicate registrations map to the right status
//! - Unsupported methods answer 405
//! - Health, stats and the demo feed are served without a key

use std::sync::Arc;

use metricat::{
    api::{HealthResponse, SeriesResponse},
    exposition::parse_exposition,
    storage::MemoryBackend,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{hub, spawn_pipeline};

#[tokio::test]
async fn test_ingest_requires_known_key() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();
    let body = json!({ "name": "cpu", "value": 1.0 });

    let missing = client
        .post(format!("http://{addr}/api/ingest"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = client
        .post(format!("http://{addr}/api/ingest"))
        .header("X-API-Key", "sk_unknown")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let error: Value = unknown.json().await.unwrap();
    assert_eq!(error["error"], "Unauthorized");
    assert_eq!(pipeline.bus.stats().await.published, 0);
}

#[tokio::test]
async fn test_unauthenticated_garbage_is_401_not_400() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/ingest"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_ingest_body_is_400() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();
    let user = hub::register(&client, addr, "bob@example.com").await;

    let garbage = client
        .post(format!("http://{addr}/api/ingest"))
        .header("X-API-Key", &user.api_key)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);

    let nameless = client
        .post(format!("http://{addr}/api/ingest"))
        .header("X-API-Key", &user.api_key)
        .json(&json!({ "name": "", "value": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(nameless.status(), StatusCode::BAD_REQUEST);

    assert_eq!(pipeline.bus.stats().await.published, 0);
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();
    let user = hub::register(&client, addr, "carol@example.com").await;

    let ingest = client
        .get(format!("http://{addr}/api/ingest"))
        .header("X-API-Key", &user.api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(ingest.status(), StatusCode::METHOD_NOT_ALLOWED);

    let rules = client
        .get(format!("http://{addr}/api/rules"))
        .header("X-API-Key", &user.api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(rules.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_register_conflict_and_validation() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();

    let first = hub::register(&client, addr, "dave@example.com").await;
    assert!(first.api_key.starts_with("sk_"));

    let duplicate = client
        .post(format!("http://{addr}/api/register"))
        .json(&json!({ "email": "dave@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let empty = client
        .post(format!("http://{addr}/api/register"))
        .json(&json!({ "email": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let second = hub::register(&client, addr, "erin@example.com").await;
    assert_ne!(first.api_key, second.api_key);
    assert_ne!(first.user_id, second.user_id);
}

#[tokio::test]
async fn test_rule_creation_validates_metric() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();
    let user = hub::register(&client, addr, "frank@example.com").await;

    let empty = client
        .post(format!("http://{addr}/api/rules"))
        .header("X-API-Key", &user.api_key)
        .json(&json!({ "metric": "", "threshold": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let unauthenticated = client
        .post(format!("http://{addr}/api/rules"))
        .json(&json!({ "metric": "cpu", "threshold": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let created = client
        .post(format!("http://{addr}/api/rules"))
        .header("X-API-Key", &user.api_key)
        .json(&json!({ "metric": "cpu", "threshold": 80.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    assert_eq!(pipeline.alert_worker.refresh_now().await.unwrap(), 1);
}

#[tokio::test]
async fn test_metrics_unknown_name_is_empty() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();
    let user = hub::register(&client, addr, "gina@example.com").await;

    let response = client
        .get(format!("http://{addr}/api/metrics?name=nope"))
        .header("X-API-Key", &user.api_key)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let series: Vec<SeriesResponse> = response.json().await.unwrap();
    assert!(series.is_empty());
}

#[tokio::test]
async fn test_public_endpoints() {
    let pipeline = spawn_pipeline(Arc::new(MemoryBackend::new())).await;
    let addr = hub::spawn_api(&pipeline).await;
    let client = reqwest::Client::new();

    let health: HealthResponse = client
        .get(format!("http://{addr}/api/v1/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");

    let stats: Value = client
        .get(format!("http://{addr}/api/v1/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["storage"]["batches_persisted"], 0);
    assert!(stats["alerts"]["refreshes"].as_u64().unwrap() >= 1);

    let demo = client
        .get(format!("http://{addr}/metrics/demo"))
        .send()
        .await
        .unwrap();
    assert_eq!(demo.status(), StatusCode::OK);

    let body = demo.text().await.unwrap();
    let series = parse_exposition(body.as_bytes(), 1).unwrap();
    assert!(series.iter().any(|s| s.metric.name == "platform_cpu"));
}
