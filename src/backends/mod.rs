//! Distributed Cache Backend Implementations
//!
//! Adapters implementing [`DistributedBackend`](crate::traits::DistributedBackend).
//!
//! # Available Backends
//!
//! ## Remote (shared across processes)
//! - **Redis** - Default shared cache (feature: `redis`)
//! - **Memcached** - Classic memcache service (feature: `memcached`)
//!
//! ## In-Process (single node, development, tests)
//! - **Moka** - Bounded concurrent cache with eviction (feature: `moka`)
//! - **`DashMap`** - Simple concurrent `HashMap` with manual TTL tracking
//!
//! # Usage
//!
//! ```rust,no_run
//! use record_cache::backends::RedisCache;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let redis = RedisCache::new().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

pub mod dashmap_cache;

#[cfg(feature = "moka")]
pub mod moka_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "memcached")]
pub mod memcached_cache;

pub use dashmap_cache::DashMapCache;

#[cfg(feature = "moka")]
pub use moka_cache::{MokaCache, MokaCacheConfig};

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

#[cfg(feature = "memcached")]
pub use memcached_cache::MemcachedCache;

/// Physical key for `key` inside `namespace`
///
/// Backends without native namespaces share one keyspace. The namespace is
/// length-prefixed, so no (namespace, key) pair can spell another pair's
/// physical key.
#[must_use]
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}:{namespace}:{key}", namespace.len())
}

/// Adapter-level statistics
///
/// Counts what the adapter itself served. Counters for the cache as a
/// whole live in [`CacheCounters`](crate::counters::CacheCounters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

/// Atomic hit / miss / set counters shared by the adapters
#[derive(Debug, Default)]
pub(crate) struct BackendCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl BackendCounters {
    pub(crate) fn record_lookup(&self, found: bool) {
        if found {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BackendStats {
        BackendStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_keys_do_not_collide() {
        assert_ne!(namespaced_key("a", "b:c"), namespaced_key("a:b", "c"));
        assert_ne!(namespaced_key("", "1:x"), namespaced_key("1", "x"));
        assert_eq!(namespaced_key("tenant", "k"), "6:tenant:k");
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = BackendCounters::default();
        counters.record_lookup(true);
        counters.record_lookup(false);
        counters.record_lookup(false);
        counters.record_set();
        assert_eq!(
            counters.snapshot(),
            BackendStats {
                hits: 1,
                misses: 2,
                sets: 1
            }
        );
    }
}
