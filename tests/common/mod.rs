//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - In-process cache systems and record stores
//! - A backend that fails every call (cache outage)
//! - A read-only context double
//! - Test data generators

#![allow(dead_code)]

use anyhow::{Result, bail};
use record_cache::dao::{DaoConfig, KeyStrategy, RecordDao, RecordDto};
use record_cache::{
    CacheConfig, CacheSystem, DashMapCache, DistributedBackend, MemoryRecordStore,
    ReadOnlyContext, async_trait,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Route `RUST_LOG`-filtered tracing output to the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Cache system over a fresh `DashMap`, plus a handle on the map
pub fn setup_cache_system(config: CacheConfig) -> (Arc<DashMapCache>, CacheSystem) {
    init_tracing();
    let backend = Arc::new(DashMapCache::new());
    let system = CacheSystem::with_backend(backend.clone(), config);
    (backend, system)
}

/// Cache system whose backend fails every call
pub fn setup_failing_cache_system() -> CacheSystem {
    init_tracing();
    CacheSystem::with_backend(Arc::new(FailingBackend), CacheConfig::default())
}

/// Record store with the given scan page size and a JSON DAO over it
pub fn setup_dao(
    kind: &str,
    strategy: KeyStrategy,
    page_size: usize,
) -> (Arc<MemoryRecordStore>, RecordDao<RecordDto>) {
    let store = Arc::new(MemoryRecordStore::with_page_size(page_size));
    let dao = RecordDao::new(store.clone(), DaoConfig::new(kind, strategy));
    (store, dao)
}

/// Distributed backend that is always unreachable
pub struct FailingBackend;

#[async_trait]
impl DistributedBackend for FailingBackend {
    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<Vec<u8>>> {
        bail!("connection refused")
    }

    async fn get_multi(
        &self,
        _namespace: &str,
        _keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        bail!("connection refused")
    }

    async fn set(&self, _namespace: &str, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        bail!("connection refused")
    }

    async fn set_multi(
        &self,
        _namespace: &str,
        _entries: &[(String, Vec<u8>)],
        _ttl: Duration,
    ) -> Result<()> {
        bail!("connection refused")
    }

    async fn delete(&self, _namespace: &str, _key: &str) -> Result<()> {
        bail!("connection refused")
    }

    async fn delete_multi(&self, _namespace: &str, _keys: &[String]) -> Result<()> {
        bail!("connection refused")
    }

    async fn incr(&self, _namespace: &str, _key: &str, _delta: i64, _initial: i64) -> Result<i64> {
        bail!("connection refused")
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "Failing"
    }
}

/// Read-only context double that records its transitions
pub struct TestContext {
    id: String,
    read_only: AtomicBool,
    begins: AtomicUsize,
    ends: AtomicUsize,
}

impl TestContext {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            read_only: AtomicBool::new(false),
            begins: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
        })
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl ReadOnlyContext for TestContext {
    fn context_id(&self) -> &str {
        &self.id
    }

    fn begin_read_only(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.read_only.store(true, Ordering::SeqCst);
    }

    fn end_read_only(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.read_only.store(false, Ordering::SeqCst);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }
}

/// Generate test data of various types
pub mod test_data {
    use record_cache::RecordDto;
    use serde_json::json;

    /// Question payload with a description
    pub fn question(description: &str) -> RecordDto {
        RecordDto::from_value(
            None,
            json!({
                "description": description,
                "type": "multiple_choice",
                "choices": ["a", "b", "c"],
            }),
        )
    }

    /// Payload of roughly `size_kb` kilobytes
    pub fn sized(size_kb: usize) -> serde_json::Value {
        json!({
            "data": "x".repeat(size_kb * 1024),
            "size_kb": size_kb,
        })
    }
}

/// Assert that cache stats meet expectations
#[macro_export]
macro_rules! assert_cache_stats {
    ($stats:expr, $field:ident == $value:expr) => {
        let stats = $stats;
        assert_eq!(
            stats.$field,
            $value,
            "Expected {} == {}, got {}",
            stringify!($field),
            $value,
            stats.$field
        );
    };
}
