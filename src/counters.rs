//! Cache counters
//!
//! Instrumentation only; nothing reads these to make a decision. Each
//! logical operation bumps its counter exactly once.

use std::sync::atomic::{AtomicU64, Ordering};

/// Relaxed atomic counters shared by the distributed tier and every facade
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    puts_too_big: AtomicU64,
    write_failures: AtomicU64,
    deletes: AtomicU64,
    local_hits: AtomicU64,
    local_misses: AtomicU64,
    local_puts: AtomicU64,
}

impl CacheCounters {
    /// Create a zeroed set of counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_put_too_big(&self) {
        self.puts_too_big.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_local_miss(&self) {
        self.local_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_local_put(&self) {
        self.local_puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy
    #[must_use]
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let local_hits = self.local_hits.load(Ordering::Relaxed);
        let local_misses = self.local_misses.load(Ordering::Relaxed);

        CacheStats {
            hits,
            misses,
            puts: self.puts.load(Ordering::Relaxed),
            puts_too_big: self.puts_too_big.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            local_hits,
            local_misses,
            local_puts: self.local_puts.load(Ordering::Relaxed),
            hit_rate: rate(hits, misses),
            local_hit_rate: rate(local_hits, local_misses),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Distributed-tier lookups that found a value
    pub hits: u64,
    /// Distributed-tier lookups that found nothing (or failed)
    pub misses: u64,
    /// Writes handed to the distributed backend
    pub puts: u64,
    /// Writes dropped for exceeding the size ceiling
    pub puts_too_big: u64,
    /// Writes the backend rejected
    pub write_failures: u64,
    /// Keys deleted from the distributed tier
    pub deletes: u64,
    /// Snapshot-map lookups answered locally
    pub local_hits: u64,
    /// Snapshot-map lookups that fell through
    pub local_misses: u64,
    /// Entries written into the snapshot map
    pub local_puts: u64,
    /// Distributed hit rate, percent
    pub hit_rate: f64,
    /// Snapshot-map hit rate, percent
    pub local_hit_rate: f64,
}
