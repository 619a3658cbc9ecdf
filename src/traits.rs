//! Cache Backend Traits
//!
//! This module defines the trait abstractions that allow users to plug in
//! their own distributed cache service and serialization codec.
//!
//! # Architecture
//!
//! - `CacheCodec`: Trait for pluggable payload serialization
//! - `DistributedBackend`: Transport contract for a remote key/value cache
//!
//! Backends deal in raw bytes and report every failure. Deciding that a
//! failure is harmless (a miss, a dropped write) is the job of
//! [`DistributedCache`](crate::distributed::DistributedCache), not of the
//! backend.
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use record_cache::{DistributedBackend, async_trait};
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use anyhow::Result;
//!
//! struct MyCache {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl DistributedBackend for MyCache {
//!     async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
//!         // Your implementation
//!     }
//!
//!     // ... implement the remaining operations
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for payload serialization/deserialization
///
/// Record payloads are stored as opaque blobs; the codec decides their
/// byte layout. [`RecordDao`](crate::dao::RecordDao) is generic over it.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access across async tasks
/// and provide debugging capabilities.
///
/// # Example: Custom Codec
///
/// ```rust,ignore
/// use record_cache::CacheCodec;
/// use anyhow::Result;
/// use serde::{Serialize, de::DeserializeOwned};
///
/// #[derive(Debug, Default)]
/// struct MyCustomCodec;
///
/// impl CacheCodec for MyCustomCodec {
///     fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
///         Ok(mycodec::serialize(value)?)
///     }
///
///     fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
///         Ok(mycodec::deserialize(bytes)?)
///     }
///
///     fn name(&self) -> &'static str {
///         "mycodec"
///     }
/// }
/// ```
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented by this codec.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Get the name of the codec
    ///
    /// This is used for logging and debugging purposes.
    fn name(&self) -> &'static str;
}

/// Transport contract for a distributed cache service
///
/// Every operation is addressed to exactly one namespace. Implementations
/// decide how to partition the keyspace (key prefixes, separate maps, ...)
/// but must never let two namespaces observe each other's keys.
///
/// # Required Operations
///
/// - `get` / `get_multi`: Retrieve values; `get_multi` returns found keys only
/// - `set` / `set_multi`: Store values with a time-to-live
/// - `delete` / `delete_multi`: Remove values (missing keys are not an error)
/// - `incr`: Atomic counter increment, creating the counter at `initial`
/// - `health_check`: Verify the service is reachable
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to support concurrent access across async tasks.
#[async_trait]
pub trait DistributedBackend: Send + Sync {
    /// Get the bytes stored under `key`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Value found
    /// * `Ok(None)` - Key not found or expired
    /// * `Err(e)` - The service could not be reached
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Get many keys at once; absent keys are omitted from the result
    async fn get_multi(
        &self,
        namespace: &str,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>>;

    /// Store `value` under `key` for `ttl`
    async fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Store every `(key, value)` pair for `ttl`
    async fn set_multi(
        &self,
        namespace: &str,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> Result<()>;

    /// Remove `key`
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// Remove every key in `keys`
    async fn delete_multi(&self, namespace: &str, keys: &[String]) -> Result<()>;

    /// Add `delta` to the counter at `key`, creating it at `initial` first
    /// if it does not exist. Returns the new value.
    async fn incr(&self, namespace: &str, key: &str, delta: i64, initial: i64) -> Result<i64>;

    /// Check if the service is healthy
    async fn health_check(&self) -> bool;

    /// Get the name of this backend
    ///
    /// This is used for logging and debugging purposes.
    fn name(&self) -> &'static str {
        "unknown"
    }
}
