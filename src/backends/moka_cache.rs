//! Moka Cache - In-Process Cache Backend
//!
//! Bounded in-memory cache using Moka. Suits single-node deployments where
//! a shared cache service is not worth running.

use anyhow::Result;
use moka::future::Cache;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{BackendCounters, BackendStats, namespaced_key};
use crate::traits::DistributedBackend;

/// Cache entry with TTL information
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

    fn counter(&self) -> Option<i64> {
        std::str::from_utf8(&self.value).ok()?.parse().ok()
    }
}

/// Configuration for `MokaCache`
#[derive(Debug, Clone, Copy)]
pub struct MokaCacheConfig {
    /// Max capacity of the cache
    pub max_capacity: u64,
    /// Upper bound on any entry's lifetime, whatever TTL the write asked for
    pub time_to_live: Duration,
    /// Time to idle for cache entries
    pub time_to_idle: Duration,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(3600),
            time_to_idle: Duration::from_secs(600),
        }
    }
}

/// Moka in-process cache with per-key TTL support
///
/// - Fast in-memory access
/// - Automatic eviction when `max_capacity` is reached
/// - Per-key TTL on top of the global time-to-live
pub struct MokaCache {
    /// Moka cache instance
    cache: Cache<String, CacheEntry>,
    /// Adapter-level hit / miss / set counters
    counters: BackendCounters,
}

impl MokaCache {
    /// Create new Moka cache
    #[must_use]
    pub fn new(config: MokaCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .time_to_idle(config.time_to_idle)
            .build();

        info!(
            capacity = config.max_capacity,
            "Moka Cache initialized with per-key TTL support"
        );

        Self {
            cache,
            counters: BackendCounters::default(),
        }
    }

    /// Hits, misses and sets served by this adapter
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }

    async fn read(&self, physical: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.cache.get(physical).await {
            if entry.is_expired() {
                self.cache.invalidate(physical).await;
                self.counters.record_lookup(false);
                None
            } else {
                self.counters.record_lookup(true);
                Some(entry.value)
            }
        } else {
            self.counters.record_lookup(false);
            None
        }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(MokaCacheConfig::default())
    }
}

#[async_trait::async_trait]
impl DistributedBackend for MokaCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read(&namespaced_key(namespace, key)).await)
    }

    async fn get_multi(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.read(&namespaced_key(namespace, key)).await {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.cache
            .insert(
                namespaced_key(namespace, key),
                CacheEntry::new(value.to_vec(), ttl),
            )
            .await;
        self.counters.record_set();
        debug!(key = %key, namespace = %namespace, ttl_secs = %ttl.as_secs(), "[Moka] Cached key with TTL");
        Ok(())
    }

    async fn set_multi(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> Result<()> {
        for (key, value) in entries {
            self.cache
                .insert(
                    namespaced_key(namespace, key),
                    CacheEntry::new(value.clone(), ttl),
                )
                .await;
        }
        self.counters.record_set();
        debug!(count = entries.len(), namespace = %namespace, "[Moka] Cached batch");
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.cache.invalidate(&namespaced_key(namespace, key)).await;
        Ok(())
    }

    async fn delete_multi(&self, namespace: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.cache.invalidate(&namespaced_key(namespace, key)).await;
        }
        Ok(())
    }

    async fn incr(&self, namespace: &str, key: &str, delta: i64, initial: i64) -> Result<i64> {
        let entry = self
            .cache
            .entry(namespaced_key(namespace, key))
            .and_upsert_with(|existing| {
                let current = existing
                    .map(moka::Entry::into_value)
                    .filter(|entry| !entry.is_expired())
                    .and_then(|entry| entry.counter())
                    .unwrap_or(initial);
                let next = current.saturating_add(delta);
                std::future::ready(CacheEntry::new(next.to_string().into_bytes(), Duration::ZERO))
            })
            .await;

        Ok(entry.into_value().counter().unwrap_or(initial))
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_moka";
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
        "Moka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MokaCache::default();
        cache.set("ns", "k", b"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("ns", "k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get("other", "k").await.unwrap(), None);

        cache.delete("ns", "k").await.unwrap();
        assert_eq!(cache.get("ns", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr() {
        let cache = MokaCache::default();
        assert_eq!(cache.incr("ns", "hits", 3, 0).await.unwrap(), 3);
        assert_eq!(cache.incr("ns", "hits", 4, 0).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = MokaCache::default();
        cache.set("ns", "k", b"v", Duration::from_secs(60)).await.unwrap();
        cache.get("ns", "k").await.unwrap();
        cache.get("a:ns", "k").await.unwrap();

        assert_eq!(
            cache.stats(),
            BackendStats {
                hits: 1,
                misses: 1,
                sets: 1
            }
        );
    }
}
