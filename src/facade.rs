//! Cache Facade - Unified Cache Operations
//!
//! The single entry point data-access code uses. Routes every call either
//! through the snapshot map (while a read-only snapshot is open) or straight
//! to the shared distributed tier.
//!
//! # Architecture
//!
//! ```text
//! get ──► snapshot map ──hit──► return
//!              │ miss / no snapshot
//!              ▼
//!         DistributedCache ──► record result locally (if snapshot) ──► return
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::counters::CacheStats;
use crate::distributed::{DistributedCache, WriteOutcome};
use crate::error::Result;
use crate::keys::counter_key;
use crate::snapshot::{ReadOnlyContext, SnapshotSession};
use crate::value::CacheValue;

/// RAII guard for a read-only snapshot
///
/// Ends the snapshot when dropped, even on early return or panic. Call
/// [`finish`](Self::finish) to observe the result of ending it.
pub struct SnapshotGuard<'a> {
    facade: &'a CacheFacade,
    context: Option<Arc<dyn ReadOnlyContext>>,
    finished: bool,
}

impl SnapshotGuard<'_> {
    /// End the snapshot now
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if the session was already torn down or switched context.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.facade.end_snapshot(self.context.as_ref())
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.facade.end_snapshot(self.context.as_ref()) {
                warn!(error = %e, "Snapshot guard failed to end snapshot");
            }
        }
    }
}

/// Cache facade for one unit of work
///
/// Cheap to build: it borrows the shared [`DistributedCache`] and owns only
/// its snapshot session and namespace. Build one per request with
/// [`CacheSystem::facade`](crate::CacheSystem::facade).
///
/// Every operation takes `namespace: Option<&str>`; `None` means the
/// facade's own namespace.
pub struct CacheFacade {
    distributed: Arc<DistributedCache>,
    namespace: String,
    session: Mutex<SnapshotSession>,
}

impl CacheFacade {
    /// Create a facade using the configured default namespace
    #[must_use]
    pub fn new(distributed: Arc<DistributedCache>) -> Self {
        let namespace = distributed.config().default_namespace.clone();
        Self {
            distributed,
            namespace,
            session: Mutex::new(SnapshotSession::new()),
        }
    }

    /// Resolve `None` namespaces to `namespace` instead of the default
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Namespace used when a call passes `None`
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn distributed(&self) -> &Arc<DistributedCache> {
        &self.distributed
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.distributed.is_enabled()
    }

    fn resolve<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace.unwrap_or(&self.namespace)
    }

    fn record_local(&self, namespace: &str, key: &str, value: Option<CacheValue>) {
        let mut session = self.session.lock();
        if let Some(local) = session.local_mut() {
            local.record(namespace, key, value);
            self.distributed.counters().record_local_put();
        }
    }

    /// Get a value
    ///
    /// # Returns
    /// * `Some(CacheValue::Found(_))` - Cached data
    /// * `Some(CacheValue::Absent)` - Cached "does not exist"
    /// * `None` - Not cached, caching disabled, or the cache failed
    pub async fn get(&self, key: &str, namespace: Option<&str>) -> Option<CacheValue> {
        if !self.is_enabled() {
            return None;
        }
        let namespace = self.resolve(namespace);
        let counters = self.distributed.counters();

        let local = self
            .session
            .lock()
            .local()
            .map(|local| local.lookup(namespace, key));
        match local {
            Some(Some(value)) => {
                counters.record_local_hit();
                return value;
            }
            Some(None) => counters.record_local_miss(),
            None => {}
        }

        let value = self.distributed.get(key, namespace).await;
        self.record_local(namespace, key, value.clone());
        value
    }

    /// Get many values; only keys with a cached value appear in the result
    pub async fn get_multi(
        &self,
        keys: &[String],
        namespace: Option<&str>,
    ) -> HashMap<String, CacheValue> {
        if !self.is_enabled() || keys.is_empty() {
            return HashMap::new();
        }
        let namespace = self.resolve(namespace);
        let counters = self.distributed.counters();

        let mut found = HashMap::with_capacity(keys.len());
        let pending: Vec<String> = {
            let session = self.session.lock();
            match session.local() {
                Some(local) => keys
                    .iter()
                    .filter(|key| match local.lookup(namespace, key) {
                        Some(value) => {
                            counters.record_local_hit();
                            if let Some(value) = value {
                                found.insert((*key).clone(), value);
                            }
                            false
                        }
                        None => {
                            counters.record_local_miss();
                            true
                        }
                    })
                    .cloned()
                    .collect(),
                None => keys.to_vec(),
            }
        };

        if pending.is_empty() {
            return found;
        }

        let fetched = self.distributed.get_multi(&pending, namespace).await;
        {
            let mut session = self.session.lock();
            if let Some(local) = session.local_mut() {
                for key in &pending {
                    local.record(namespace, key, fetched.get(key).cloned());
                    counters.record_local_put();
                }
            }
        }

        found.extend(fetched);
        found
    }

    /// Set a value. `ttl` of `None` uses the configured default.
    ///
    /// Never fails: the outcome says whether the value was stored.
    pub async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) -> WriteOutcome {
        let namespace = self.resolve(namespace);
        let outcome = self.distributed.set(key, &value, ttl, namespace).await;
        if outcome.attempted() {
            self.record_local(namespace, key, Some(value));
        }
        outcome
    }

    /// Set many values in one call
    pub async fn set_multi(
        &self,
        entries: Vec<(String, CacheValue)>,
        ttl: Option<Duration>,
        namespace: Option<&str>,
    ) -> WriteOutcome {
        let namespace = self.resolve(namespace);
        let outcome = self.distributed.set_multi(&entries, ttl, namespace).await;
        if outcome.attempted() {
            let mut session = self.session.lock();
            if let Some(local) = session.local_mut() {
                let counters = self.distributed.counters();
                for (key, value) in entries {
                    local.record(namespace, &key, Some(value));
                    counters.record_local_put();
                }
            }
        }
        outcome
    }

    fn ensure_no_snapshot(&self, operation: &str) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_active() {
            return Err(session.violation(&format!("{operation} during a read-only snapshot")));
        }
        Ok(())
    }

    /// Fail unless the facade may write: no snapshot may be open
    ///
    /// Callers that write to a store and then invalidate the cache check
    /// this before the store write.
    pub(crate) fn ensure_writable(&self, operation: &str) -> Result<()> {
        self.ensure_no_snapshot(operation)
    }

    /// Delete a value
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if a snapshot is open; the snapshot is cleared. Cache failures are
    /// logged, not returned.
    pub async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<()> {
        self.ensure_no_snapshot("delete")?;
        self.distributed.delete(key, self.resolve(namespace)).await;
        Ok(())
    }

    /// Delete many values
    ///
    /// # Errors
    ///
    /// Same as [`delete`](Self::delete).
    pub async fn delete_multi(&self, keys: &[String], namespace: Option<&str>) -> Result<()> {
        self.ensure_no_snapshot("delete_multi")?;
        self.distributed
            .delete_multi(keys, self.resolve(namespace))
            .await;
        Ok(())
    }

    /// Atomically add `delta` to a counter, creating it at `initial`
    pub async fn increment(
        &self,
        key: &str,
        delta: i64,
        namespace: Option<&str>,
        initial: i64,
    ) -> Option<i64> {
        self.distributed
            .increment(key, delta, self.resolve(namespace), initial)
            .await
    }

    /// Add to a process-wide counter aggregated in the distributed cache
    ///
    /// No-op returning `None` unless `aggregate_counters` is configured.
    pub async fn incr_global_counter(&self, name: &str, delta: i64) -> Option<i64> {
        let config = self.distributed.config();
        if !config.aggregate_counters {
            return None;
        }
        self.distributed
            .increment(&counter_key(name), delta, &config.default_namespace, 0)
            .await
    }

    /// Current value of a global counter
    pub async fn global_counter(&self, name: &str) -> Option<i64> {
        self.incr_global_counter(name, 0).await
    }

    // ===== Snapshot =====

    /// Open (or re-enter) a read-only snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if `context` differs from the context that opened the snapshot.
    pub fn begin_snapshot(&self, context: Option<Arc<dyn ReadOnlyContext>>) -> Result<()> {
        self.session.lock().begin(context)
    }

    /// Leave one level of the snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`](crate::Error::InvariantViolation)
    /// if no snapshot is open or `context` does not own it.
    pub fn end_snapshot(&self, context: Option<&Arc<dyn ReadOnlyContext>>) -> Result<()> {
        self.session.lock().end(context)
    }

    /// Drop the snapshot regardless of nesting
    pub fn clear_snapshot(&self) {
        self.session.lock().clear();
    }

    /// Open a snapshot that ends when the guard is dropped
    ///
    /// # Errors
    ///
    /// Same as [`begin_snapshot`](Self::begin_snapshot).
    pub fn snapshot(
        &self,
        context: Option<Arc<dyn ReadOnlyContext>>,
    ) -> Result<SnapshotGuard<'_>> {
        self.begin_snapshot(context.clone())?;
        Ok(SnapshotGuard {
            facade: self,
            context,
            finished: false,
        })
    }

    #[must_use]
    pub fn is_snapshot_active(&self) -> bool {
        self.session.lock().is_active()
    }

    #[must_use]
    pub fn snapshot_depth(&self) -> usize {
        self.session.lock().depth()
    }

    /// Number of entries held by the open snapshot
    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.session.lock().local().map_or(0, |local| local.len())
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.distributed.counters().snapshot()
    }
}
