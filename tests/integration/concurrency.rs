//! Concurrency and race condition tests
//!
//! These tests verify thread-safety and concurrent operation:
//! - Many concurrent publishers sharing one storage group
//! - Queue-group members splitting a subject's load
//! - Readers never observing a partially written batch

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use metricat::{
    Batch,
    actors::StorageHandle,
    bus::{INGEST_SUBJECT, InProcessBus, MessageBus, STORAGE_GROUP, codec},
    gateway::{Gateway, IngestRequest},
    storage::{MemoryBackend, SeriesQuery, StorageBackend},
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_gateway_publishers() {
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let pipeline = spawn_pipeline(store.clone()).await;
    let gateway = Gateway::new(store.clone(), pipeline.bus.clone());

    let mut tasks = vec![];
    for i in 0..50i64 {
        let gateway = gateway.clone();
        tasks.push(tokio::spawn(async move {
            gateway
                .admit(1, IngestRequest::new("requests", i as f64, i))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(
        wait_until(|| {
            let store = store.clone();
            async move {
                store
                    .query(SeriesQuery::for_user(1).metric("requests"))
                    .await
                    .unwrap()
                    .first()
                    .is_some_and(|s| s.samples.len() == 50)
            }
        })
        .await
    );

    let stored = store.query(SeriesQuery::for_user(1)).await.unwrap();
    let timestamps: Vec<i64> = stored[0].samples.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_storage_group_members_share_the_load() {
    let bus = Arc::new(InProcessBus::default());
    let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());

    let first = StorageHandle::spawn(store.clone(), bus.as_ref(), INGEST_SUBJECT, STORAGE_GROUP)
        .await
        .unwrap();
    let second = StorageHandle::spawn(store.clone(), bus.as_ref(), INGEST_SUBJECT, STORAGE_GROUP)
        .await
        .unwrap();

    for t in 0..10 {
        let batch = Batch::new(1, vec![series("cpu", &[(t, 1.0)])]);
        bus.publish(INGEST_SUBJECT, codec::encode_batch(&batch).unwrap())
            .await
            .unwrap();
    }

    assert!(
        wait_until(|| {
            let (first, second) = (first.clone(), second.clone());
            async move {
                let a = first.get_stats().await.map_or(0, |s| s.batches_persisted);
                let b = second.get_stats().await.map_or(0, |s| s.batches_persisted);
                a + b == 10
            }
        })
        .await
    );

    // round-robin within the group, each batch stored exactly once
    assert_eq!(first.get_stats().await.unwrap().batches_persisted, 5);
    assert_eq!(second.get_stats().await.unwrap().batches_persisted, 5);
    let stored = store.query(SeriesQuery::for_user(1)).await.unwrap();
    assert_eq!(stored[0].samples.len(), 10);
}

#[tokio::test]
async fn test_readers_see_whole_batches() {
    let store = Arc::new(MemoryBackend::new());

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for t in 0..100 {
                let batch = Batch::new(
                    1,
                    vec![series("a", &[(t, 1.0)]), series("b", &[(t, 1.0)])],
                );
                store.append_batch(&batch).await.unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let stored = store.query(SeriesQuery::for_user(1)).await.unwrap();
                let counts: HashSet<usize> = stored.iter().map(|s| s.samples.len()).collect();
                // both series always advance together
                assert!(counts.len() <= 1, "torn batch: {counts:?}");
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

#[tokio::test]
async fn test_fan_out_to_many_groups() {
    let bus = Arc::new(InProcessBus::default());

    let mut subscriptions = vec![];
    for group in 0..8 {
        subscriptions.push(
            bus.subscribe_queue_group(INGEST_SUBJECT, &format!("group-{group}"))
                .await
                .unwrap(),
        );
    }

    bus.publish(INGEST_SUBJECT, b"payload".to_vec()).await.unwrap();

    for subscription in &mut subscriptions {
        let message = subscription.next().await.unwrap();
        assert_eq!(message.payload, b"payload".to_vec());
    }
}
