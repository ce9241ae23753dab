//! Queue settings and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::ExtractionConfig;

/// Per-queue settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum history length
    pub max_history: usize,

    /// Convert and deliver on the pushing thread
    pub blocking: bool,

    /// Keep only the newest staged sample per worker round
    pub drop_extra_input: bool,

    /// Trim payloads exceeding the declared size by less than this many bytes
    pub size_diff_threshold: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for QueueSettings {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_history: config.max_history.max(1),
            blocking: config.blocking,
            drop_extra_input: config.drop_extra_input,
            size_diff_threshold: config.size_diff_threshold,
        }
    }
}

/// Queue metrics
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Raw samples accepted by `push`
    pub received: AtomicU64,

    /// Samples converted into history
    pub converted: AtomicU64,

    /// Staged samples discarded by `drop_extra_input`
    pub dropped: AtomicU64,

    /// History entries evicted to make room
    pub evicted: AtomicU64,

    /// Conversion failures
    pub conversion_failures: AtomicU64,

    /// Current history length
    pub history_depth: AtomicUsize,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_converted(&self) {
        self.converted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conversion_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_history_depth(&self, depth: usize) {
        self.history_depth.store(depth, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            history_depth: self.history_depth.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub received: u64,
    pub converted: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub conversion_failures: u64,
    pub history_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_extraction_config() {
        let config = ExtractionConfig {
            max_history: 0,
            blocking: true,
            drop_extra_input: true,
            size_diff_threshold: 16,
        };
        let settings = QueueSettings::from(&config);

        assert_eq!(settings.max_history, 1);
        assert!(settings.blocking);
        assert!(settings.drop_extra_input);
        assert_eq!(settings.size_diff_threshold, 16);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = QueueMetrics::new();
        metrics.record_received();
        metrics.record_received();
        metrics.record_converted();
        metrics.record_dropped(3);
        metrics.update_history_depth(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.converted, 1);
        assert_eq!(snapshot.dropped, 3);
        assert_eq!(snapshot.history_depth, 1);
    }
}
