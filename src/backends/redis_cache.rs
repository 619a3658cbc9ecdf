//! Redis Cache - Distributed Cache Backend
//!
//! Redis-based shared cache. Namespaces are key prefixes.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{BackendCounters, BackendStats, namespaced_key};
use crate::traits::DistributedBackend;

/// Redis distributed cache with `ConnectionManager` for automatic reconnection
///
/// - Shared across every process pointing at the same server
/// - Automatic reconnection via `ConnectionManager`
/// - `MGET` for multi-gets, one pipeline for multi-sets
pub struct RedisCache {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    /// Adapter-level hit / miss / set counters
    counters: BackendCounters,
}

impl RedisCache {
    /// Create new Redis cache from `REDIS_URL` (default `redis://127.0.0.1:6379`)
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn new() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::with_url(&redis_url).await
    }

    /// Create new Redis cache with custom URL
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        info!(redis_url = %redis_url, "Initializing Redis Cache with ConnectionManager");

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redis_url}"))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Redis Cache connected successfully (ConnectionManager enabled)");

        Ok(Self {
            conn_manager,
            counters: BackendCounters::default(),
        })
    }

    /// Hits, misses and sets served by this adapter
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        self.counters.snapshot()
    }
}

fn set_cmd(physical: &str, value: &[u8], ttl: Duration) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(physical).arg(value);
    // A zero TTL means "no expiry"; Redis rejects `EX 0`.
    if ttl.as_secs() > 0 {
        cmd.arg("EX").arg(ttl.as_secs());
    }
    cmd
}

#[async_trait::async_trait]
impl DistributedBackend for RedisCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn.get(namespaced_key(namespace, key)).await?;
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
        let mut conn = self.conn_manager.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&physical)
            .query_async(&mut conn)
            .await?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            self.counters.record_lookup(value.is_some());
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let () = set_cmd(&namespaced_key(namespace, key), value, ttl)
            .query_async(&mut conn)
            .await?;
        self.counters.record_set();
        debug!(key = %key, namespace = %namespace, ttl_secs = %ttl.as_secs(), "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn set_multi(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.add_command(set_cmd(&namespaced_key(namespace, key), value, ttl))
                .ignore();
        }

        let mut conn = self.conn_manager.clone();
        let () = pipe.query_async(&mut conn).await?;
        self.counters.record_set();
        debug!(count = entries.len(), namespace = %namespace, "[Redis] Cached batch");
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: usize = conn.del(namespaced_key(namespace, key)).await?;
        Ok(())
    }

    async fn delete_multi(&self, namespace: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let physical: Vec<String> = keys.iter().map(|k| namespaced_key(namespace, k)).collect();
        let mut conn = self.conn_manager.clone();
        let count: usize = conn.del(physical).await?;
        debug!(count = count, namespace = %namespace, "[Redis] Removed keys in bulk");
        Ok(())
    }

    async fn incr(&self, namespace: &str, key: &str, delta: i64, initial: i64) -> Result<i64> {
        let physical = namespaced_key(namespace, key);
        let mut conn = self.conn_manager.clone();

        // SET NX seeds the counter without clobbering an existing one.
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&physical)
            .arg(initial)
            .arg("NX")
            .ignore()
            .cmd("INCRBY")
            .arg(&physical)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_redis";
        let test_value = vec![1, 2, 3, 4];

        match self
            .set("health", test_key, &test_value, Duration::from_secs(10))
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
        "Redis"
    }
}
