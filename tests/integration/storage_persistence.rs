//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Batches delivered over the bus land in the SQLite store
//! - Users, keys and rules survive a reopen of the database
//! - Default-tenant normalization holds across backends

use std::sync::Arc;

use metricat::{
    AlertRule, Batch,
    bus::{INGEST_SUBJECT, MessageBus, codec},
    storage::{SeriesQuery, StorageBackend, sqlite::SqliteBackend},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_bus_batches_persist_across_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("metricat.db");

    {
        let backend = SqliteBackend::new(&db_path, 1).await.unwrap();
        let store: Arc<dyn StorageBackend> = Arc::new(backend);
        let pipeline = spawn_pipeline(store.clone()).await;

        for batch in [
            Batch::new(0, vec![series("cpu", &[(30, 3.0), (10, 1.0)])]),
            Batch::new(0, vec![series("cpu", &[(20, 2.0)]), series("mem", &[(10, 50.0)])]),
        ] {
            let payload = codec::encode_batch(&batch).unwrap();
            pipeline.bus.publish(INGEST_SUBJECT, payload).await.unwrap();
        }

        let storage_worker = pipeline.storage_worker.clone();
        assert!(
            wait_until(|| {
                let storage_worker = storage_worker.clone();
                async move {
                    storage_worker
                        .get_stats()
                        .await
                        .is_some_and(|stats| stats.samples_persisted == 4)
                }
            })
            .await
        );

        pipeline.bus.close().await;
        store.close().await.unwrap();
    }

    let reopened = SqliteBackend::new(&db_path, 1).await.unwrap();
    let stored = reopened.query(SeriesQuery::for_user(1)).await.unwrap();

    assert_eq!(
        stored,
        vec![
            series("cpu", &[(10, 1.0), (20, 2.0), (30, 3.0)]),
            series("mem", &[(10, 50.0)]),
        ]
    );
}

#[tokio::test]
async fn test_users_and_rules_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("metricat.db");

    let user = {
        let backend = SqliteBackend::new(&db_path, 1).await.unwrap();
        let user = backend.create_user("ops@example.com").await.unwrap();
        backend
            .create_alert_rule(AlertRule::new(user.user_id, "cpu", 75.0))
            .await
            .unwrap();
        backend.close().await.unwrap();
        user
    };

    let reopened = SqliteBackend::new(&db_path, 1).await.unwrap();

    assert_eq!(reopened.verify_key(&user.api_key).await.unwrap(), Some(user.user_id));
    assert_eq!(
        reopened.get_alert_rules(Some(user.user_id)).await.unwrap(),
        vec![AlertRule::new(user.user_id, "cpu", 75.0)]
    );
    assert!(reopened.create_user("ops@example.com").await.is_err());
}

#[tokio::test]
async fn test_time_range_query_on_sqlite() {
    let temp_dir = tempdir().unwrap();
    let backend = SqliteBackend::new(temp_dir.path().join("metricat.db"), 1)
        .await
        .unwrap();

    backend
        .append_batch(&Batch::new(
            4,
            vec![series("disk", &[(100, 1.0), (200, 2.0), (300, 3.0)])],
        ))
        .await
        .unwrap();

    let stored = backend
        .query(SeriesQuery::for_user(4).metric("disk").between(150, 300))
        .await
        .unwrap();

    assert_eq!(stored, vec![series("disk", &[(200, 2.0), (300, 3.0)])]);
}
