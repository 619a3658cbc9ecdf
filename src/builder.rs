//! Cache System Builder
//!
//! Provides a builder pattern for constructing `CacheSystem` with a custom
//! distributed backend and configuration.
//!
//! # Example: Using Defaults
//!
//! ```rust,no_run
//! use record_cache::CacheSystemBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Redis from REDIS_URL, config from the environment
//!     let system = CacheSystemBuilder::new().build().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use record_cache::{CacheConfig, CacheSystemBuilder};
//! use std::sync::Arc;
//!
//! let system = CacheSystemBuilder::new()
//!     .with_backend(Arc::new(MyMemcachedBackend::new()))
//!     .with_config(CacheConfig::default().with_namespace("tenant-a"))
//!     .build()
//!     .await?;
//! ```

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::CacheSystem;
use crate::config::CacheConfig;
use crate::distributed::DistributedCache;
use crate::traits::DistributedBackend;

/// Builder for constructing `CacheSystem`
///
/// # Default Behavior
///
/// - **Backend**: Redis when the `redis` feature is on, otherwise Moka, otherwise `DashMap`
/// - **Config**: [`CacheConfig::from_env`]
pub struct CacheSystemBuilder {
    backend: Option<Arc<dyn DistributedBackend>>,
    config: Option<CacheConfig>,
}

impl CacheSystemBuilder {
    /// Create a new builder with nothing configured
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: None,
            config: None,
        }
    }

    /// Use a custom distributed backend
    ///
    /// # Arguments
    ///
    /// * `backend` - Any type implementing `DistributedBackend`
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn DistributedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use an explicit configuration instead of reading the environment
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the `CacheSystem`
    ///
    /// # Errors
    ///
    /// Returns an error if the default backend cannot be initialized (e.g.
    /// Redis is unreachable).
    pub async fn build(self) -> Result<CacheSystem> {
        info!("Building Record Cache System");

        let config = self.config.unwrap_or_else(CacheConfig::from_env);
        let backend = match self.backend {
            Some(backend) => {
                info!(backend = %backend.name(), "Using custom distributed backend");
                backend
            }
            None => default_backend().await?,
        };

        let distributed = Arc::new(DistributedCache::new(backend, config));
        info!(
            backend = %distributed.backend_name(),
            enabled = distributed.is_enabled(),
            namespace = %distributed.config().default_namespace,
            "Record Cache System built successfully"
        );

        Ok(CacheSystem::from_distributed(distributed))
    }
}

impl Default for CacheSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "redis")]
async fn default_backend() -> Result<Arc<dyn DistributedBackend>> {
    info!("Using default distributed backend (Redis)");
    Ok(Arc::new(crate::backends::RedisCache::new().await?))
}

#[cfg(all(not(feature = "redis"), feature = "moka"))]
#[allow(clippy::unused_async)]
async fn default_backend() -> Result<Arc<dyn DistributedBackend>> {
    info!("Using default distributed backend (Moka, in-process)");
    Ok(Arc::new(crate::backends::MokaCache::default()))
}

#[cfg(all(not(feature = "redis"), not(feature = "moka")))]
#[allow(clippy::unused_async)]
async fn default_backend() -> Result<Arc<dyn DistributedBackend>> {
    info!("Using default distributed backend (DashMap, in-process)");
    Ok(Arc::new(crate::backends::DashMapCache::new()))
}
