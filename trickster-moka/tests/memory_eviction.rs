//! Tests for memory-based cache eviction.

use std::time::Duration;

use bytes::Bytes;
use trickster_backend::Backend;
use trickster_moka::{EvictionPolicy, MokaBackend};

fn value(size: usize) -> Bytes {
    Bytes::from(vec![0u8; size])
}

#[tokio::test]
async fn entry_capacity_evicts_beyond_max_entries() {
    let backend = MokaBackend::builder()
        .max_entries(3)
        .eviction_policy(EvictionPolicy::lru())
        .build();

    for i in 1..=3u32 {
        backend
            .set(&i.to_string(), value(100), Duration::from_secs(60))
            .await
            .unwrap();
    }
    backend.run_pending_tasks().await;

    for i in 1..=3u32 {
        assert!(backend.get(&i.to_string()).await.unwrap().is_some());
    }

    backend
        .set("4", value(100), Duration::from_secs(60))
        .await
        .unwrap();
    backend.run_pending_tasks().await;

    assert!(backend.get("4").await.unwrap().is_some());

    let mut remaining = 0;
    for i in 1..=4u32 {
        if backend.get(&i.to_string()).await.unwrap().is_some() {
            remaining += 1;
        }
    }
    assert_eq!(remaining, 3, "oldest entry should have been evicted");
}

#[tokio::test]
async fn byte_capacity_evicts_by_weighed_size() {
    let backend = MokaBackend::builder().max_bytes(250).build();

    backend
        .set("small-1", value(50), Duration::from_secs(60))
        .await
        .unwrap();
    backend
        .set("small-2", value(50), Duration::from_secs(60))
        .await
        .unwrap();
    backend.run_pending_tasks().await;

    assert!(backend.get("small-1").await.unwrap().is_some());
    assert!(backend.get("small-2").await.unwrap().is_some());

    backend
        .set("large", value(200), Duration::from_secs(60))
        .await
        .unwrap();
    backend.run_pending_tasks().await;

    assert!(backend.get("large").await.unwrap().is_some());

    let small1 = backend.get("small-1").await.unwrap().is_some();
    let small2 = backend.get("small-2").await.unwrap().is_some();
    assert!(
        !small1 || !small2,
        "at least one small entry should be evicted to fit the large one"
    );
}

#[tokio::test]
async fn zero_ttl_does_not_expire_on_its_own() {
    let backend = MokaBackend::builder().max_entries(10).build();
    backend.set("k", value(10), Duration::ZERO).await.unwrap();
    backend.run_pending_tasks().await;
    assert!(backend.get("k").await.unwrap().is_some());
}

#[tokio::test]
async fn ttl_expiry_is_honored() {
    tokio::time::pause();
    let backend = MokaBackend::builder().max_entries(10).build();
    backend
        .set("k", value(10), Duration::from_millis(10))
        .await
        .unwrap();
    assert!(backend.get("k").await.unwrap().is_some());

    tokio::time::advance(Duration::from_millis(50)).await;
    backend.run_pending_tasks().await;
    assert!(backend.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn set_again_refreshes_ttl_rather_than_keeping_old_deadline() {
    tokio::time::pause();
    let backend = MokaBackend::builder().max_entries(10).build();
    backend
        .set("k", value(10), Duration::from_millis(10))
        .await
        .unwrap();
    backend
        .set("k", value(10), Duration::from_secs(60))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_millis(50)).await;
    backend.run_pending_tasks().await;
    assert!(
        backend.get("k").await.unwrap().is_some(),
        "the refreshed, longer TTL should win over the original short one"
    );
}

#[tokio::test]
async fn remove_deletes_entry() {
    let backend = MokaBackend::builder().max_entries(10).build();
    backend.set("k", value(10), Duration::from_secs(60)).await.unwrap();
    backend.remove("k").await.unwrap();
    assert!(backend.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn configuration_reports_max_object_size() {
    let backend = MokaBackend::builder()
        .max_entries(10)
        .max_object_size_bytes(1024)
        .build();
    assert_eq!(backend.configuration().max_object_size_bytes, 1024);
}
