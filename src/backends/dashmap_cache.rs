//! `DashMap` Cache - Simple Concurrent `HashMap` Backend
//!
//! A lightweight in-process stand-in for a distributed cache using `DashMap`.
//! This is also the reference implementation of [`DistributedBackend`].

use anyhow::{Result, bail};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{BackendCounters, BackendStats, namespaced_key};
use crate::traits::DistributedBackend;

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: (!ttl.is_zero()).then(|| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// Simple concurrent cache using `DashMap`
///
/// **Features**:
/// - Lock-free concurrent reads/writes
/// - Manual TTL tracking (a zero TTL never expires)
/// - Namespaces via key prefixes
///
/// **Limitations**:
/// - No eviction policy and no size limits (unbounded growth)
/// - Expired entries are only removed when read or by `cleanup_expired`
/// - Not shared across processes
///
/// **Example**:
/// ```rust
/// use record_cache::backends::DashMapCache;
/// use record_cache::DistributedBackend;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let cache = DashMapCache::new();
/// cache.set("tenant-a", "user:1", b"alice", Duration::from_secs(60)).await?;
/// assert_eq!(cache.get("tenant-a", "user:1").await?, Some(b"alice".to_vec()));
/// assert_eq!(cache.get("tenant-b", "user:1").await?, None);
/// # Ok(())
/// # }
/// ```
pub struct DashMapCache {
    /// Concurrent `HashMap` keyed by namespaced key
    map: Arc<DashMap<String, CacheEntry>>,
    /// Adapter-level hit / miss / set counters
    counters: BackendCounters,
}

impl DashMapCache {
    /// Create new `DashMap` cache
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing DashMap Cache (concurrent HashMap)");

        Self {
            map: Arc::new(DashMap::new()),
            counters: BackendCounters::default(),
        }
    }

    /// Cleanup expired entries (should be called periodically)
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[DashMap] Cleaned up expired entries");
        }
        removed
    }

    /// Drop every entry in every namespace
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Get current cache size
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Hits, misses and sets served by this adapter
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }

    fn read(&self, physical: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.map.get(physical) {
            if entry.is_expired() {
                drop(entry); // Release read lock
                self.map.remove(physical);
                self.counters.record_lookup(false);
                None
            } else {
                self.counters.record_lookup(true);
                Some(entry.value.clone())
            }
        } else {
            self.counters.record_lookup(false);
            None
        }
    }
}

impl Default for DashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DistributedBackend for DashMapCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read(&namespaced_key(namespace, key)))
    }

    async fn get_multi(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.read(&namespaced_key(namespace, key))
                    .map(|value| (key.clone(), value))
            })
            .collect())
    }

    async fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.map.insert(
            namespaced_key(namespace, key),
            CacheEntry::new(value.to_vec(), ttl),
        );
        self.counters.record_set();
        debug!(key = %key, namespace = %namespace, ttl_secs = %ttl.as_secs(), "[DashMap] Cached key with TTL");
        Ok(())
    }

    async fn set_multi(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> Result<()> {
        for (key, value) in entries {
            self.map.insert(
                namespaced_key(namespace, key),
                CacheEntry::new(value.clone(), ttl),
            );
        }
        self.counters.record_set();
        debug!(count = entries.len(), namespace = %namespace, "[DashMap] Cached batch");
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.map.remove(&namespaced_key(namespace, key));
        Ok(())
    }

    async fn delete_multi(&self, namespace: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.map.remove(&namespaced_key(namespace, key));
        }
        Ok(())
    }

    async fn incr(&self, namespace: &str, key: &str, delta: i64, initial: i64) -> Result<i64> {
        let physical = namespaced_key(namespace, key);
        match self.map.entry(physical) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                let current: i64 = match std::str::from_utf8(&occupied.get().value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                {
                    Some(current) => current,
                    None => bail!("value at {key} is not a counter"),
                };
                let next = current.saturating_add(delta);
                occupied.get_mut().value = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                let next = initial.saturating_add(delta);
                occupied.insert(CacheEntry::new(next.to_string().into_bytes(), Duration::ZERO));
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                let next = initial.saturating_add(delta);
                vacant.insert(CacheEntry::new(next.to_string().into_bytes(), Duration::ZERO));
                Ok(next)
            }
        }
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_dashmap";
        let test_value = b"health_check_value";

        match self
            .set("health", test_key, test_value, Duration::from_secs(60))
            .await
        {
            Ok(()) => match self.get("health", test_key).await {
                Ok(Some(retrieved)) => {
                    let _ = self.delete("health", test_key).await;
                    retrieved == test_value
                }
                _ => false,
            },
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}
