//! Distributed Cache - Contract Wrapper Around a Backend
//!
//! Applies the feature flag, size ceilings and counters on top of a
//! [`DistributedBackend`], and turns every backend failure into a miss or a
//! dropped write. Nothing here returns an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codecs::JsonCodec;
use crate::config::CacheConfig;
use crate::counters::CacheCounters;
use crate::traits::{CacheCodec, DistributedBackend};
use crate::value::CacheValue;

/// What happened to a write handed to the distributed cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The backend accepted the write
    Stored,
    /// Skipped: the encoded value (or batch) exceeded the size ceiling
    TooBig,
    /// The backend or the encoder failed; logged and counted
    Failed,
    /// Caching is switched off
    Disabled,
    /// A multi-write with nothing in it
    Empty,
}

impl WriteOutcome {
    /// `true` if the write reached the backend, successfully or not
    #[must_use]
    pub fn attempted(self) -> bool {
        matches!(self, Self::Stored | Self::Failed)
    }
}

/// Shared distributed cache tier
///
/// One instance is shared by every [`CacheFacade`](crate::facade::CacheFacade)
/// built from a [`CacheSystem`](crate::CacheSystem).
pub struct DistributedCache {
    backend: Arc<dyn DistributedBackend>,
    codec: JsonCodec,
    config: CacheConfig,
    counters: Arc<CacheCounters>,
}

impl DistributedCache {
    /// Wrap `backend` with a fresh set of counters
    #[must_use]
    pub fn new(backend: Arc<dyn DistributedBackend>, config: CacheConfig) -> Self {
        Self::with_counters(backend, config, Arc::new(CacheCounters::new()))
    }

    /// Wrap `backend`, reporting into existing counters
    #[must_use]
    pub fn with_counters(
        backend: Arc<dyn DistributedBackend>,
        config: CacheConfig,
        counters: Arc<CacheCounters>,
    ) -> Self {
        Self {
            backend,
            codec: JsonCodec,
            config,
            counters,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    /// Name of the wrapped backend
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check the wrapped backend
    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Option<CacheValue> {
        match self.codec.deserialize::<CacheValue>(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Look up `key`; `None` on a miss, a backend failure or a bad payload
    pub async fn get(&self, key: &str, namespace: &str) -> Option<CacheValue> {
        if !self.config.enabled {
            return None;
        }

        let value = match self.backend.get(namespace, key).await {
            Ok(Some(bytes)) => self.decode(key, &bytes),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, namespace = %namespace, error = %e, "Cache get failed, treating as miss");
                None
            }
        };

        if value.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        value
    }

    /// Look up many keys; only keys that were found appear in the result
    pub async fn get_multi(&self, keys: &[String], namespace: &str) -> HashMap<String, CacheValue> {
        if !self.config.enabled || keys.is_empty() {
            return HashMap::new();
        }

        let raw = match self.backend.get_multi(namespace, keys).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(count = keys.len(), namespace = %namespace, error = %e, "Cache get_multi failed, treating as miss");
                HashMap::new()
            }
        };

        let mut found = HashMap::with_capacity(raw.len());
        for key in keys {
            match raw.get(key).and_then(|bytes| self.decode(key, bytes)) {
                Some(value) => {
                    self.counters.record_hit();
                    found.insert(key.clone(), value);
                }
                None => self.counters.record_miss(),
            }
        }
        found
    }

    /// Store `value` under `key`. `ttl` of `None` uses the configured default.
    pub async fn set(
        &self,
        key: &str,
        value: &CacheValue,
        ttl: Option<Duration>,
        namespace: &str,
    ) -> WriteOutcome {
        if !self.config.enabled {
            return WriteOutcome::Disabled;
        }

        let bytes = match self.codec.serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                self.counters.record_write_failure();
                return WriteOutcome::Failed;
            }
        };

        if bytes.len() > self.config.max_item_bytes {
            warn!(
                key = %key,
                size = bytes.len(),
                limit = self.config.max_item_bytes,
                "Cache entry too big, skipping"
            );
            self.counters.record_put_too_big();
            return WriteOutcome::TooBig;
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        match self.backend.set(namespace, key, &bytes, ttl).await {
            Ok(()) => {
                self.counters.record_put();
                debug!(key = %key, namespace = %namespace, size = bytes.len(), "Cache set");
                WriteOutcome::Stored
            }
            Err(e) => {
                warn!(key = %key, namespace = %namespace, error = %e, "Cache set failed");
                self.counters.record_write_failure();
                WriteOutcome::Failed
            }
        }
    }

    /// Store every entry in one backend call
    ///
    /// The ceiling applies to the whole call: the sum of key and encoded
    /// value sizes.
    pub async fn set_multi(
        &self,
        entries: &[(String, CacheValue)],
        ttl: Option<Duration>,
        namespace: &str,
    ) -> WriteOutcome {
        if !self.config.enabled {
            return WriteOutcome::Disabled;
        }
        if entries.is_empty() {
            return WriteOutcome::Empty;
        }

        let mut encoded = Vec::with_capacity(entries.len());
        let mut total = 0usize;
        for (key, value) in entries {
            match self.codec.serialize(value) {
                Ok(bytes) => {
                    total = total.saturating_add(key.len() + bytes.len());
                    encoded.push((key.clone(), bytes));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to encode cache entry");
                    self.counters.record_write_failure();
                    return WriteOutcome::Failed;
                }
            }
        }

        if total > self.config.max_batch_bytes {
            warn!(
                count = entries.len(),
                size = total,
                limit = self.config.max_batch_bytes,
                "Cache batch too big, skipping"
            );
            self.counters.record_put_too_big();
            return WriteOutcome::TooBig;
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        match self.backend.set_multi(namespace, &encoded, ttl).await {
            Ok(()) => {
                self.counters.record_put();
                debug!(count = entries.len(), namespace = %namespace, size = total, "Cache set_multi");
                WriteOutcome::Stored
            }
            Err(e) => {
                warn!(count = entries.len(), namespace = %namespace, error = %e, "Cache set_multi failed");
                self.counters.record_write_failure();
                WriteOutcome::Failed
            }
        }
    }

    /// Remove `key`; failures are logged
    pub async fn delete(&self, key: &str, namespace: &str) {
        if !self.config.enabled {
            return;
        }
        match self.backend.delete(namespace, key).await {
            Ok(()) => self.counters.record_deletes(1),
            Err(e) => {
                warn!(key = %key, namespace = %namespace, error = %e, "Cache delete failed");
            }
        }
    }

    /// Remove every key in `keys`; failures are logged
    pub async fn delete_multi(&self, keys: &[String], namespace: &str) {
        if !self.config.enabled || keys.is_empty() {
            return;
        }
        match self.backend.delete_multi(namespace, keys).await {
            Ok(()) => self.counters.record_deletes(keys.len() as u64),
            Err(e) => {
                warn!(count = keys.len(), namespace = %namespace, error = %e, "Cache delete_multi failed");
            }
        }
    }

    /// Atomically add `delta` to the counter at `key`, starting from
    /// `initial`. `None` when disabled or on failure.
    pub async fn increment(
        &self,
        key: &str,
        delta: i64,
        namespace: &str,
        initial: i64,
    ) -> Option<i64> {
        if !self.config.enabled {
            return None;
        }
        match self.backend.incr(namespace, key, delta, initial).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, namespace = %namespace, error = %e, "Cache increment failed");
                None
            }
        }
    }
}
