//! Record Cache
//!
//! A cache-accelerated persistence layer for small JSON records kept in a
//! remote key/value store:
//! - **Distributed tier**: shared cache (Redis, Memcached, Moka, `DashMap`)
//!   with size ceilings, negative caching and failure absorption
//! - **Read-only snapshots**: reentrant per-request freeze of what the cache
//!   returns, served from a local map
//! - **Record DAOs**: read-through / write-through access per entity kind,
//!   with bulk loads, batched saves and an aggregate "all records" entry
//! - **Statistics**: hit, miss, put and oversize counters for both tiers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use record_cache::dao::{DaoConfig, KeyStrategy, RecordDao, RecordDto};
//! use record_cache::store::MemoryRecordStore;
//! use record_cache::CacheSystem;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let system = CacheSystem::new().await?;
//!     let questions: RecordDao<RecordDto> = RecordDao::new(
//!         Arc::new(MemoryRecordStore::new()),
//!         DaoConfig::new("Question", KeyStrategy::NumericId),
//!     );
//!
//!     // One facade per unit of work
//!     let cache = system.facade();
//!     let _guard = cache.snapshot(None)?;
//!     let all = questions.get_all(&cache).await?;
//!     tracing::info!(count = all.len(), "Loaded questions");
//!
//!     let stats = cache.stats();
//!     tracing::info!("Hit rate: {:.2}%", stats.hit_rate);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! RecordDao → CacheFacade → snapshot map → DistributedCache → backend
//!     │                      (if active)
//!     └──── miss ────► RecordStore (authoritative)
//! ```

use std::sync::Arc;
use tracing::{info, warn};

pub mod backends;
pub mod builder;
pub mod codecs;
pub mod config;
pub mod counters;
pub mod dao;
pub mod distributed;
pub mod error;
pub mod facade;
pub mod keys;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod value;

pub use backends::DashMapCache;

// Optional backends (feature-gated)
#[cfg(feature = "memcached")]
pub use backends::MemcachedCache;
#[cfg(feature = "moka")]
pub use backends::{MokaCache, MokaCacheConfig};
#[cfg(feature = "redis")]
pub use backends::RedisCache;

pub use builder::CacheSystemBuilder;
pub use codecs::JsonCodec;
pub use config::CacheConfig;
pub use counters::{CacheCounters, CacheStats};
pub use dao::{DaoConfig, Dto, KeyStrategy, RecordDao, RecordDto};
pub use distributed::{DistributedCache, WriteOutcome};
pub use error::{Error, Result};
pub use facade::{CacheFacade, SnapshotGuard};
pub use snapshot::{LocalSnapshotCache, ReadOnlyContext, SnapshotSession};
pub use store::{MemoryRecordStore, Record, RecordKey, RecordStore, ScanCursor, ScanPage};
pub use traits::{CacheCodec, DistributedBackend};
pub use value::CacheValue;

// Re-export async_trait for user convenience
pub use async_trait::async_trait;

/// Main entry point: one shared distributed tier per process
///
/// Cloning is cheap. Build a [`CacheFacade`] per unit of work with
/// [`facade`](Self::facade); snapshot state lives in the facade, never here.
///
/// # Example
///
/// ```rust,no_run
/// use record_cache::CacheSystem;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let system = CacheSystem::new().await?;
///     let cache = system.facade();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheSystem {
    /// Shared distributed tier
    pub distributed: Arc<DistributedCache>,
}

impl CacheSystem {
    /// Create new cache system backed by Redis
    ///
    /// # Configuration
    ///
    /// Redis connection is configured via `REDIS_URL` environment variable
    /// (default: `redis://127.0.0.1:6379`); everything else via
    /// [`CacheConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if Redis cannot be reached.
    #[cfg(feature = "redis")]
    pub async fn new() -> anyhow::Result<Self> {
        info!("Initializing Record Cache System");
        let redis = Arc::new(RedisCache::new().await?);
        let system = Self::with_backend(redis, CacheConfig::from_env());
        info!("Record Cache System initialized successfully");
        Ok(system)
    }

    /// Create cache system with custom Redis URL
    ///
    /// # Errors
    ///
    /// Returns an error if Redis cannot be reached.
    #[cfg(feature = "redis")]
    pub async fn with_redis_url(redis_url: &str) -> anyhow::Result<Self> {
        info!(redis_url = %redis_url, "Initializing Record Cache System with custom Redis URL");
        let redis = Arc::new(RedisCache::with_url(redis_url).await?);
        Ok(Self::with_backend(redis, CacheConfig::from_env()))
    }

    /// Cache system over an in-process `DashMap` with default configuration
    ///
    /// For tests, development and single-process deployments.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(DashMapCache::new()), CacheConfig::default())
    }

    /// Cache system over any backend
    #[must_use]
    pub fn with_backend(backend: Arc<dyn DistributedBackend>, config: CacheConfig) -> Self {
        Self::from_distributed(Arc::new(DistributedCache::new(backend, config)))
    }

    #[must_use]
    pub fn from_distributed(distributed: Arc<DistributedCache>) -> Self {
        Self { distributed }
    }

    /// New facade for one unit of work
    #[must_use]
    pub fn facade(&self) -> CacheFacade {
        CacheFacade::new(Arc::clone(&self.distributed))
    }

    /// Shared distributed tier
    #[must_use]
    pub fn distributed(&self) -> &Arc<DistributedCache> {
        &self.distributed
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        self.distributed.config()
    }

    /// Process-wide statistics across every facade
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.distributed.counters().snapshot()
    }

    /// Perform health check on the distributed backend
    ///
    /// A disabled cache is always healthy.
    pub async fn health_check(&self) -> bool {
        if !self.distributed.is_enabled() {
            return true;
        }
        let ok = self.distributed.health_check().await;
        if ok {
            info!(backend = %self.distributed.backend_name(), "Record Cache health check passed");
        } else {
            warn!(backend = %self.distributed.backend_name(), "Record Cache health check failed");
        }
        ok
    }
}
