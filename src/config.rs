//! Cache configuration
//!
//! Defaults follow the limits of a memcached-style service: a single value
//! may not exceed 1 MiB minus the per-item overhead, and one batch may not
//! exceed 32 MiB.

use std::time::Duration;
use tracing::warn;

/// Largest encoded value accepted by a single write
pub const DEFAULT_MAX_ITEM_BYTES: usize = 1024 * 1024 - 96 - 250;

/// Largest encoded batch (keys + values) accepted by one multi-write
pub const DEFAULT_MAX_BATCH_BYTES: usize = 32 * 1024 * 1024;

/// Default entry lifetime: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Namespace used when neither the caller nor the facade names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration shared by every facade built from one
/// [`CacheSystem`](crate::CacheSystem)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global switch. When off, reads miss and writes are dropped.
    pub enabled: bool,
    /// TTL applied when a write does not name one
    pub default_ttl: Duration,
    /// Per-item size ceiling for single writes
    pub max_item_bytes: usize,
    /// Per-call size ceiling for multi-writes
    pub max_batch_bytes: usize,
    /// Namespace resolved for calls that pass `None`
    pub default_namespace: String,
    /// Whether global counters are aggregated in the distributed cache
    pub aggregate_counters: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: DEFAULT_TTL,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            aggregate_counters: false,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the environment, falling back to defaults
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `RECORD_CACHE_ENABLED` | `enabled` |
    /// | `RECORD_CACHE_TTL_SECS` | `default_ttl` |
    /// | `RECORD_CACHE_NAMESPACE` | `default_namespace` |
    /// | `RECORD_CACHE_AGGREGATE_COUNTERS` | `aggregate_counters` |
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_parse::<bool>("RECORD_CACHE_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(secs) = env_parse::<u64>("RECORD_CACHE_TTL_SECS") {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Ok(namespace) = std::env::var("RECORD_CACHE_NAMESPACE") {
            if !namespace.is_empty() {
                config.default_namespace = namespace;
            }
        }
        if let Some(aggregate) = env_parse::<bool>("RECORD_CACHE_AGGREGATE_COUNTERS") {
            config.aggregate_counters = aggregate;
        }

        config
    }

    /// Turn caching on or off
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the default TTL
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the per-item size ceiling
    #[must_use]
    pub fn with_max_item_bytes(mut self, bytes: usize) -> Self {
        self.max_item_bytes = bytes;
        self
    }

    /// Set the per-batch size ceiling
    #[must_use]
    pub fn with_max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Set the default namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Enable or disable global counter aggregation
    #[must_use]
    pub fn with_aggregate_counters(mut self, enabled: bool) -> Self {
        self.aggregate_counters = enabled;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = %name, value = %raw, "Ignoring unparseable cache setting");
            None
        }
    }
}
