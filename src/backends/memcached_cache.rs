//! Memcached Cache - Distributed Cache Backend
//!
//! Memcached-based shared cache. Namespaces are key prefixes.

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{BackendCounters, BackendStats, namespaced_key};
use crate::traits::DistributedBackend;

/// Memcached distributed cache
///
/// - Shared across every process pointing at the same servers
/// - LRU eviction, no persistence
/// - Multi-key reads in one round trip (`gets`)
///
/// **Note**: Memcached counters are unsigned, so `incr` rejects a negative
/// initial value and clamps decrements at zero.
pub struct MemcachedCache {
    /// Memcached client
    client: memcache::Client,
    /// Adapter-level hit / miss / set counters
    counters: BackendCounters,
}

impl MemcachedCache {
    /// Create new Memcached cache
    ///
    /// # Configuration
    ///
    /// Uses `MEMCACHED_URL` environment variable or defaults to `memcache://127.0.0.1:11211`
    ///
    /// # Errors
    ///
    /// Returns an error if the Memcached client cannot be created.
    pub fn new() -> Result<Self> {
        let memcached_url = std::env::var("MEMCACHED_URL")
            .unwrap_or_else(|_| "memcache://127.0.0.1:11211".to_string());
        Self::with_url(&memcached_url)
    }

    /// Create new Memcached cache with custom URL
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot connect or the version check fails.
    pub fn with_url(memcached_url: &str) -> Result<Self> {
        info!(url = %memcached_url, "Initializing Memcached Cache");

        let client = memcache::connect(memcached_url)
            .map_err(|e| anyhow!("Failed to connect to Memcached: {e}"))?;

        let versions = client
            .version()
            .map_err(|e| anyhow!("Memcached connection test failed: {e}"))?;
        info!(
            url = %memcached_url,
            server_count = versions.len(),
            "Memcached Cache connected successfully"
        );

        Ok(Self {
            client,
            counters: BackendCounters::default(),
        })
    }

    /// Hits, misses and sets served by this adapter
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }

    /// Get cache statistics (from Memcached server)
    ///
    /// Each tuple contains (`server_address`, `stats_map`)
    ///
    /// # Errors
    ///
    /// Returns an error if any server fails to answer.
    pub fn get_server_stats(&self) -> Result<Vec<(String, HashMap<String, String>)>> {
        self.client
            .stats()
            .map_err(|e| anyhow!("Failed to get Memcached stats: {e}"))
    }
}

fn expiration(ttl: Duration) -> u32 {
    u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX)
}

#[async_trait::async_trait]
impl DistributedBackend for MemcachedCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self
            .client
            .get(&namespaced_key(namespace, key))
            .map_err(|e| anyhow!("Memcached GET failed: {e}"))?;
        self.counters.record_lookup(value.is_some());
        Ok(value)
    }

    async fn get_multi(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let physical: Vec<String> = keys.iter().map(|k| namespaced_key(namespace, k)).collect();
        let refs: Vec<&str> = physical.iter().map(String::as_str).collect();
        let mut values: HashMap<String, Vec<u8>> = self
            .client
            .gets(&refs)
            .map_err(|e| anyhow!("Memcached GETS failed: {e}"))?;

        let mut found = HashMap::with_capacity(values.len());
        for (key, physical_key) in keys.iter().zip(&physical) {
            let value = values.remove(physical_key);
            self.counters.record_lookup(value.is_some());
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.client
            .set(&namespaced_key(namespace, key), value, expiration(ttl))
            .map_err(|e| anyhow!("Memcached SET failed: {e}"))?;

        self.counters.record_set();
        debug!(key = %key, namespace = %namespace, ttl_secs = %ttl.as_secs(), "[Memcached] Cached key with TTL");
        Ok(())
    }

    async fn set_multi(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> Result<()> {
        for (key, value) in entries {
            self.client
                .set(
                    &namespaced_key(namespace, key),
                    value.as_slice(),
                    expiration(ttl),
                )
                .map_err(|e| anyhow!("Memcached SET failed: {e}"))?;
        }
        self.counters.record_set();
        debug!(count = entries.len(), namespace = %namespace, "[Memcached] Cached batch");
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        self.client
            .delete(&namespaced_key(namespace, key))
            .map_err(|e| anyhow!("Memcached DELETE failed: {e}"))?;
        Ok(())
    }

    async fn delete_multi(&self, namespace: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.delete(namespace, key).await?;
        }
        Ok(())
    }

    async fn incr(&self, namespace: &str, key: &str, delta: i64, initial: i64) -> Result<i64> {
        if initial < 0 {
            bail!("Memcached counters cannot start below zero (initial = {initial})");
        }
        let physical = namespaced_key(namespace, key);

        // `add` only stores when the key is absent; losing the race is fine.
        let _ = self.client.add(&physical, initial.to_string().as_str(), 0);

        let amount = delta.unsigned_abs();
        let value = if delta >= 0 {
            self.client.increment(&physical, amount)
        } else {
            self.client.decrement(&physical, amount)
        }
        .map_err(|e| anyhow!("Memcached INCR failed: {e}"))?;

        Ok(i64::try_from(value)?)
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_memcached";
        let test_value = b"health_check_value";

        match self
            .set("health", test_key, test_value, Duration::from_secs(10))
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
        "Memcached"
    }
}
