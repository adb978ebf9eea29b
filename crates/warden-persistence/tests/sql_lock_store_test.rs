//! SqlLockStore tests against in-memory SQLite

use std::sync::Arc;

use futures::TryStreamExt;
use warden_common::validation::MAX_VALUE_LENGTH;
use warden_common::{LockError, LockKind, LockRecord, Resource};
use warden_persistence::{DatabaseOptions, LockStore, SqlLockStore, bootstrap, connect};

const TTL: i64 = 10_000;

async fn store() -> SqlLockStore {
    let db = connect(&DatabaseOptions::new("sqlite::memory:"))
        .await
        .unwrap();
    bootstrap(&db).await.unwrap();
    SqlLockStore::new(db)
}

fn lock(key: &str, owner: &str) -> Resource {
    Resource::new(key, owner, LockKind::Lock)
}

#[tokio::test]
async fn test_insert_then_fetch() {
    let store = store().await;
    let resource = lock("job-17", "worker-A").with_value(b"payload".to_vec());

    let record = store.insert_or_take_over(&resource, TTL, 1_000).await.unwrap();
    assert_eq!(record.modification_index, 1);
    assert_eq!(record.deadline_ms, Some(11_000));

    let fetched = store.fetch("job-17").await.unwrap();
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn test_fetch_missing_key() {
    let store = store().await;
    assert_eq!(
        store.fetch("missing").await.unwrap_err(),
        LockError::not_found("missing")
    );
}

#[tokio::test]
async fn test_live_holder_blocks_other_owner() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    let err = store
        .insert_or_take_over(&lock("job-17", "worker-B"), TTL, 2_000)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LockError::AlreadyHeld {
            key: "job-17".to_string(),
            owner: "worker-A".to_string(),
            modification_index: 1,
        }
    );
}

#[tokio::test]
async fn test_same_owner_refresh_bumps_index() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();
    let refreshed = store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 5_000)
        .await
        .unwrap();
    assert_eq!(refreshed.modification_index, 2);
    assert_eq!(refreshed.deadline_ms, Some(15_000));
}

#[tokio::test]
async fn test_same_owner_other_kind_is_mismatch() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("svc", "node-1"), TTL, 1_000)
        .await
        .unwrap();

    let presence = Resource::new("svc", "node-1", LockKind::Presence);
    let err = store
        .insert_or_take_over(&presence, TTL, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LockError::KindMismatch {
            existing: LockKind::Lock,
            requested: LockKind::Presence,
            ..
        }
    ));
}

#[tokio::test]
async fn test_expired_record_is_taken_over() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    let record = store
        .insert_or_take_over(&lock("job-17", "worker-B"), TTL, 11_001)
        .await
        .unwrap();
    assert_eq!(record.owner, "worker-B");
    assert_eq!(record.modification_index, 2);

    let err = store.release("job-17", "worker-A", 11_002).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwner { current_owner: Some(ref o), .. } if o == "worker-B"));
}

#[tokio::test]
async fn test_deadline_boundary_is_still_live() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    // deadline == now is not yet expired
    assert!(
        store
            .insert_or_take_over(&lock("job-17", "worker-B"), TTL, 11_000)
            .await
            .is_err()
    );
    assert_eq!(store.delete_expired(11_000).await.unwrap(), 0);
}

#[tokio::test]
async fn test_index_survives_release() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();
    assert!(store.release("job-17", "worker-A", 2_000).await.unwrap());

    let record = store
        .insert_or_take_over(&lock("job-17", "worker-B"), TTL, 3_000)
        .await
        .unwrap();
    assert_eq!(record.modification_index, 2);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let store = store().await;
    assert!(!store.release("never-held", "worker-A", 1_000).await.unwrap());

    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();
    assert!(store.release("job-17", "worker-A", 2_000).await.unwrap());
    assert!(!store.release("job-17", "worker-A", 2_000).await.unwrap());
}

#[tokio::test]
async fn test_release_of_expired_record_by_other_owner() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();
    assert!(!store.release("job-17", "worker-B", 20_000).await.unwrap());
    // the expired row is left for the sweeper
    assert_eq!(store.delete_expired(20_000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_keys_and_owners_are_case_sensitive() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("Job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    // a key differing only in case is another resource
    let other = store
        .insert_or_take_over(&lock("job-17", "worker-B"), TTL, 1_000)
        .await
        .unwrap();
    assert_eq!(other.modification_index, 1);
    assert_eq!(store.fetch("Job-17").await.unwrap().owner, "worker-A");

    let err = store.release("Job-17", "WORKER-A", 2_000).await.unwrap_err();
    assert!(matches!(err, LockError::NotOwner { current_owner: Some(ref o), .. } if o == "worker-A"));

    let err = store
        .insert_or_take_over(&lock("Job-17", "WORKER-A"), TTL, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::AlreadyHeld { .. }));
}

#[tokio::test]
async fn test_largest_value_round_trips() {
    let store = store().await;
    let value = vec![0xA5; MAX_VALUE_LENGTH];
    store
        .insert_or_take_over(&lock("job-17", "worker-A").with_value(value.clone()), TTL, 1_000)
        .await
        .unwrap();
    assert_eq!(store.fetch("job-17").await.unwrap().value, value);
}

#[tokio::test]
async fn test_renew_extends_deadline() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    let renewed = store
        .renew(&lock("job-17", "worker-A"), TTL, 9_000)
        .await
        .unwrap();
    assert_eq!(renewed.deadline_ms, Some(19_000));
    assert_eq!(renewed.modification_index, 2);

    // the old deadline has passed but the renewed record survives a sweep
    assert_eq!(store.delete_expired(12_000).await.unwrap(), 0);
    assert_eq!(store.fetch("job-17").await.unwrap().deadline_ms, Some(19_000));
}

#[tokio::test]
async fn test_renew_outcomes() {
    let store = store().await;
    assert_eq!(
        store
            .renew(&lock("job-17", "worker-A"), TTL, 1_000)
            .await
            .unwrap_err(),
        LockError::not_found("job-17")
    );

    store
        .insert_or_take_over(&lock("job-17", "worker-A"), TTL, 1_000)
        .await
        .unwrap();

    let err = store
        .renew(&lock("job-17", "worker-B"), TTL, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::NotOwner { .. }));

    let err = store
        .renew(&Resource::new("job-17", "worker-A", LockKind::Presence), TTL, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::KindMismatch { .. }));

    // an expired record cannot be renewed
    let err = store
        .renew(&lock("job-17", "worker-A"), TTL, 20_000)
        .await
        .unwrap_err();
    assert_eq!(err, LockError::not_found("job-17"));
}

#[tokio::test]
async fn test_delete_expired_only_removes_expired() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("short", "a"), 1_000, 1_000)
        .await
        .unwrap();
    store
        .insert_or_take_over(&lock("long", "b"), 60_000, 1_000)
        .await
        .unwrap();
    store
        .insert_or_take_over(&lock("forever", "c"), 0, 1_000)
        .await
        .unwrap();

    assert_eq!(store.delete_expired(5_000).await.unwrap(), 1);
    assert!(store.fetch("short").await.is_err());
    assert!(store.fetch("long").await.is_ok());
    assert_eq!(store.fetch("forever").await.unwrap().deadline_ms, None);
}

#[tokio::test]
async fn test_fetch_all_and_count_live() {
    let store = store().await;
    store
        .insert_or_take_over(&lock("a", "x"), TTL, 1_000)
        .await
        .unwrap();
    store
        .insert_or_take_over(&lock("b", "x"), 100, 1_000)
        .await
        .unwrap();
    store
        .insert_or_take_over(&Resource::new("svc", "x", LockKind::Presence), TTL, 1_000)
        .await
        .unwrap();

    let all: Vec<LockRecord> = store.fetch_all(None).await.unwrap().try_collect().await.unwrap();
    assert_eq!(all.len(), 3);

    let presences: Vec<LockRecord> = store
        .fetch_all(Some(LockKind::Presence))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(presences.len(), 1);
    assert_eq!(presences[0].key, "svc");

    assert_eq!(store.count_live(LockKind::Lock, 5_000).await.unwrap(), 1);
    assert_eq!(store.count_live(LockKind::Presence, 5_000).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_acquire_single_winner() {
    let store = Arc::new(store().await);

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert_or_take_over(&lock("job-17", &format!("worker-{}", i)), TTL, 1_000)
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(LockError::AlreadyHeld { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_monitor_counts_queries() {
    let store = store().await;
    let monitor = store.monitor();
    store.health_check().await.unwrap();
    let _ = store.fetch("missing").await;

    let snapshot = monitor.snapshot_and_reset();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.failed, 0);
}
