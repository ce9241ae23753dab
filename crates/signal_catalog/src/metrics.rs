//! Catalog metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CatalogMetrics {
    /// Completed discovery cycles
    pub cycles: AtomicU64,

    /// Topics evicted for staleness or invalidation
    pub evictions: AtomicU64,

    /// Pending resolutions fired
    pub resolutions_fired: AtomicU64,

    /// Descriptors that could not be decoded
    pub schema_failures: AtomicU64,

    /// Tracked topics after the last cycle
    pub topics: AtomicUsize,
}

impl CatalogMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, topics: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.topics.store(topics, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_resolution_fired(&self) {
        self.resolutions_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schema_failure(&self) {
        self.schema_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CatalogMetricsSnapshot {
        CatalogMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            resolutions_fired: self.resolutions_fired.load(Ordering::Relaxed),
            schema_failures: self.schema_failures.load(Ordering::Relaxed),
            topics: self.topics.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogMetricsSnapshot {
    pub cycles: u64,
    pub evictions: u64,
    pub resolutions_fired: u64,
    pub schema_failures: u64,
    pub topics: usize,
}
