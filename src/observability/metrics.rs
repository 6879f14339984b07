//! Refcount index metrics
//!
//! - Counters only, monotonic
//! - Relaxed atomics; exactness under concurrency is not required
//! - Reporting is fire-and-forget and never fails the caller

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one maintainer
#[derive(Debug, Default)]
pub struct IndexMetrics {
    /// Update calls applied
    updates: AtomicU64,
    /// Commutative increments issued
    increments: AtomicU64,
    /// Read-modify-write decrements issued
    decrements: AtomicU64,
    /// Counters that reached zero
    zero_transitions: AtomicU64,
    /// Raw index entries loaded by scans and lookups
    index_keys_loaded: AtomicU64,
    /// Bytes of index keys loaded
    index_key_bytes: AtomicU64,
    /// Bytes of index values loaded
    index_value_bytes: AtomicU64,
    /// Keys seen in both regions during a scan
    scan_collisions: AtomicU64,
}

impl IndexMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_increments(&self) {
        self.increments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decrements(&self) {
        self.decrements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_zero_transitions(&self) {
        self.zero_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scan_collisions(&self) {
        self.scan_collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one raw key/value read from the index keyspace
    pub fn count_key_value(&self, key_len: usize, value_len: usize) {
        self.index_keys_loaded.fetch_add(1, Ordering::Relaxed);
        self.index_key_bytes
            .fetch_add(key_len as u64, Ordering::Relaxed);
        self.index_value_bytes
            .fetch_add(value_len as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            increments: self.increments.load(Ordering::Relaxed),
            decrements: self.decrements.load(Ordering::Relaxed),
            zero_transitions: self.zero_transitions.load(Ordering::Relaxed),
            index_keys_loaded: self.index_keys_loaded.load(Ordering::Relaxed),
            index_key_bytes: self.index_key_bytes.load(Ordering::Relaxed),
            index_value_bytes: self.index_value_bytes.load(Ordering::Relaxed),
            scan_collisions: self.scan_collisions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub updates: u64,
    pub increments: u64,
    pub decrements: u64,
    pub zero_transitions: u64,
    pub index_keys_loaded: u64,
    pub index_key_bytes: u64,
    pub index_value_bytes: u64,
    pub scan_collisions: u64,
}
