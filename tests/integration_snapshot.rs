//! Integration tests for read-only snapshot sessions

mod common;

use common::*;
use record_cache::dao::KeyStrategy;
use record_cache::{CacheConfig, CacheValue, Dto, Error, ReadOnlyContext, WriteOutcome};
use serde_json::json;
use std::sync::Arc;

/// begin, begin, end leaves the snapshot open; a third end fails clean
#[tokio::test]
async fn test_reentrancy() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();

    cache.begin_snapshot(None).unwrap();
    cache.begin_snapshot(None).unwrap();
    cache.end_snapshot(None).unwrap();
    assert!(cache.is_snapshot_active());
    assert_eq!(cache.snapshot_depth(), 1);

    cache.get("k", None).await;
    assert_eq!(cache.snapshot_len(), 1);

    cache.end_snapshot(None).unwrap();
    assert!(!cache.is_snapshot_active());

    let err = cache.end_snapshot(None).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(!cache.is_snapshot_active());
    assert_eq!(cache.snapshot_depth(), 0);
    assert_eq!(cache.snapshot_len(), 0);
}

/// Lookups inside a snapshot reach the distributed tier once per key
#[tokio::test]
async fn test_snapshot_freezes_lookups() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let writer = system.facade();
    let reader = system.facade();
    let key = test_key("frozen");

    writer.set(&key, CacheValue::found("v1"), None, None).await;

    let _guard = reader.snapshot(None).unwrap();
    assert_eq!(reader.get(&key, None).await, Some(CacheValue::found("v1")));

    // Another unit of work changes the shared tier
    writer.set(&key, CacheValue::found("v2"), None, None).await;
    assert_eq!(reader.get(&key, None).await, Some(CacheValue::found("v1")));
    assert_eq!(writer.get(&key, None).await, Some(CacheValue::found("v2")));

    let stats = system.stats();
    assert_eq!(stats.local_hits, 1);
    assert_eq!(stats.local_misses, 1);
}

/// A recorded miss is answered locally too
#[tokio::test]
async fn test_snapshot_records_misses() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    let keys = vec![test_key("a"), test_key("b")];

    let _guard = cache.snapshot(None).unwrap();
    assert!(cache.get_multi(&keys, None).await.is_empty());
    assert!(cache.get_multi(&keys, None).await.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.local_hits, 2);
    assert_eq!(stats.local_misses, 2);
}

/// Partially-known batches only fetch the unknown keys
#[tokio::test]
async fn test_snapshot_get_multi_mixes_tiers() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    cache.set("a", CacheValue::found(1), None, None).await;
    cache.set("b", CacheValue::found(2), None, None).await;

    let _guard = cache.snapshot(None).unwrap();
    cache.get("a", None).await;

    let found = cache
        .get_multi(&["a".to_string(), "b".to_string()], None)
        .await;
    assert_eq!(found.len(), 2);

    let stats = cache.stats();
    // "a" once by get, "b" once by get_multi
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.local_hits, 1);
}

/// Writes populate the map unless they were dropped before the backend
#[tokio::test]
async fn test_snapshot_write_policy() {
    let (_, system) = setup_cache_system(CacheConfig::default().with_max_item_bytes(256));
    let cache = system.facade();

    let _guard = cache.snapshot(None).unwrap();
    let outcome = cache.set("small", CacheValue::found(1), None, None).await;
    assert_eq!(outcome, WriteOutcome::Stored);
    let outcome = cache
        .set("big", CacheValue::found("x".repeat(1024)), None, None)
        .await;
    assert_eq!(outcome, WriteOutcome::TooBig);

    assert_eq!(cache.snapshot_len(), 1);
    assert_eq!(cache.get("small", None).await, Some(CacheValue::found(1)));
    assert_cache_stats!(cache.stats(), local_hits == 1);
}

/// Failed writes during an outage still serve the rest of the request
#[tokio::test]
async fn test_snapshot_keeps_failed_writes_locally() {
    let system = setup_failing_cache_system();
    let cache = system.facade();

    let _guard = cache.snapshot(None).unwrap();
    let outcome = cache
        .set_multi(vec![("k".to_string(), CacheValue::Absent)], None, None)
        .await;
    assert_eq!(outcome, WriteOutcome::Failed);
    assert_eq!(cache.get("k", None).await, Some(CacheValue::Absent));
}

/// Deleting inside a snapshot is rejected and tears the session down
#[tokio::test]
async fn test_delete_during_snapshot() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    let context = TestContext::new("course-a");
    let owner: Arc<dyn ReadOnlyContext> = context.clone();

    cache.begin_snapshot(Some(owner.clone())).unwrap();
    cache.get("k", None).await;

    let err = cache
        .delete_multi(&["k".to_string()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(!cache.is_snapshot_active());
    assert_eq!(cache.snapshot_len(), 0);
    assert!(!context.is_read_only());

    // Nothing left to end
    assert!(cache.end_snapshot(Some(&owner)).is_err());
}

/// Saving through a DAO inside a snapshot is a delete inside a snapshot
#[tokio::test]
async fn test_save_during_snapshot_is_rejected() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let (_, dao) = setup_dao("Unit", KeyStrategy::NumericId, 10);
    let cache = system.facade();

    let _guard = cache.snapshot(None).unwrap();
    let mut unit = test_data::question("Unit 1");
    let err = dao.save(&cache, &mut unit).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(!cache.is_snapshot_active());
    assert!(unit.id.is_none());
}

/// Writes refused inside a snapshot never reach the store
#[tokio::test]
async fn test_rejected_writes_leave_the_store_untouched() {
    let (backend, system) = setup_cache_system(CacheConfig::default());
    let (store, dao) = setup_dao("Unit", KeyStrategy::NumericId, 10);
    let cache = system.facade();

    let mut unit = test_data::question("Unit 1");
    let id = dao.save(&cache, &mut unit).await.unwrap();
    let writes = store.write_calls();

    cache.begin_snapshot(None).unwrap();
    let mut edited = unit.clone();
    edited.dict.insert("description".to_string(), json!("Unit 1 edited"));
    let err = dao.save(&cache, &mut edited).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    cache.begin_snapshot(None).unwrap();
    let mut batch = vec![test_data::question("Unit 2")];
    let err = dao.save_all(&cache, &mut batch).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(batch[0].id.is_none());

    cache.begin_snapshot(None).unwrap();
    let err = dao.delete(&cache, &unit).await.unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(!cache.is_snapshot_active());

    assert_eq!(store.write_calls(), writes);
    assert_eq!(store.len("Unit"), 1);

    backend.clear();
    let loaded = dao.load(&cache, Some(&id)).await.unwrap().unwrap();
    assert_eq!(loaded.description(), Some("Unit 1"));
}

/// The owning context is frozen exactly once per outermost session
#[tokio::test]
async fn test_context_is_frozen_for_the_outermost_session() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    let context = TestContext::new("course-a");
    let owner: Arc<dyn ReadOnlyContext> = context.clone();

    cache.begin_snapshot(Some(owner.clone())).unwrap();
    cache.begin_snapshot(Some(owner.clone())).unwrap();
    assert!(context.is_read_only());
    cache.end_snapshot(Some(&owner)).unwrap();
    assert!(context.is_read_only());
    cache.end_snapshot(Some(&owner)).unwrap();

    assert!(!context.is_read_only());
    assert_eq!(context.begins(), 1);
    assert_eq!(context.ends(), 1);
}

/// Switching context mid-session is a violation
#[tokio::test]
async fn test_context_switch_is_rejected() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    let course_a = TestContext::new("course-a");
    let owner: Arc<dyn ReadOnlyContext> = course_a.clone();
    let intruder: Arc<dyn ReadOnlyContext> = TestContext::new("course-b");

    cache.begin_snapshot(Some(owner.clone())).unwrap();
    let err = cache.begin_snapshot(Some(intruder)).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
    assert!(!cache.is_snapshot_active());
    assert!(!course_a.is_read_only());

    cache.begin_snapshot(Some(owner.clone())).unwrap();
    assert!(cache.end_snapshot(None).is_err());
    assert!(!cache.is_snapshot_active());
}

/// clear_snapshot resets any depth and releases the context
#[tokio::test]
async fn test_clear_snapshot() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    let context = TestContext::new("course-a");
    let owner: Arc<dyn ReadOnlyContext> = context.clone();

    for _ in 0..3 {
        cache.begin_snapshot(Some(owner.clone())).unwrap();
    }
    assert_eq!(cache.snapshot_depth(), 3);
    cache.clear_snapshot();

    assert!(!cache.is_snapshot_active());
    assert!(!context.is_read_only());
    cache.begin_snapshot(None).unwrap();
    cache.end_snapshot(None).unwrap();
}

/// The guard closes the session on early return
#[tokio::test]
async fn test_guard_closes_on_early_return() {
    async fn handler(cache: &record_cache::CacheFacade) -> record_cache::Result<()> {
        let _guard = cache.snapshot(None)?;
        cache.get("k", None).await;
        Err(Error::InvariantViolation("bail out".into()))
    }

    let (_, system) = setup_cache_system(CacheConfig::default());
    let cache = system.facade();
    assert!(handler(&cache).await.is_err());
    assert!(!cache.is_snapshot_active());
}

/// Snapshots are per facade, not per process
#[tokio::test]
async fn test_snapshots_do_not_leak_between_facades() {
    let (_, system) = setup_cache_system(CacheConfig::default());
    let first = system.facade();
    let second = system.facade();

    let _guard = first.snapshot(None).unwrap();
    assert!(first.is_snapshot_active());
    assert!(!second.is_snapshot_active());
    second.delete("k", None).await.unwrap();
    second.set("k", CacheValue::found(json!({"v": 1})), None, None).await;
    assert_eq!(first.snapshot_len(), 0);
}
