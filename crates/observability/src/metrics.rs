//! Metric recording helpers
//!
//! Thin wrappers over the `metrics` facade so every crate uses the same names
//! and labels. Also carries an in-memory aggregator for run summaries.

use std::collections::HashMap;

use metrics::{counter, gauge, histogram};

/// Record a raw sample accepted by a topic queue
pub fn record_sample_received(topic: &str) {
    counter!(
        "sigflow_samples_received_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record a raw sample converted and appended to history
pub fn record_sample_converted(topic: &str) {
    counter!(
        "sigflow_samples_converted_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record staged samples discarded because the queue keeps only the newest
pub fn record_samples_dropped(topic: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "sigflow_samples_dropped_total",
        "topic" => topic.to_string()
    )
    .increment(count as u64);
}

/// Record a failed conversion
pub fn record_conversion_failure(topic: &str) {
    counter!(
        "sigflow_conversion_failures_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record current history depth of a topic queue
pub fn record_history_depth(topic: &str, depth: usize) {
    gauge!(
        "sigflow_history_depth",
        "topic" => topic.to_string()
    )
    .set(depth as f64);
}

/// Record one discovery cycle
pub fn record_discovery_cycle(duration_ms: f64, catalog_size: usize) {
    counter!("sigflow_discovery_cycles_total").increment(1);
    histogram!("sigflow_discovery_cycle_ms").record(duration_ms);
    gauge!("sigflow_catalog_topics").set(catalog_size as f64);
}

/// Record topics evicted for staleness
pub fn record_stale_evictions(count: usize) {
    if count > 0 {
        counter!("sigflow_catalog_evictions_total").increment(count as u64);
    }
}

/// Record pending resolutions fired
pub fn record_resolutions_fired(count: usize) {
    if count > 0 {
        counter!("sigflow_resolutions_fired_total").increment(count as u64);
    }
}

/// Record one synchronised selection
pub fn record_sync_selection(strategy: &str, found: bool, obsolete: usize) {
    let status = if found { "found" } else { "not_found" };
    counter!(
        "sigflow_sync_selections_total",
        "strategy" => strategy.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if found {
        histogram!(
            "sigflow_sync_obsolete_entries",
            "strategy" => strategy.to_string()
        )
        .record(obsolete as f64);
    }
}

/// Selection aggregator
///
/// Aggregates synchronised selections in memory, for summaries at shutdown.
#[derive(Debug, Clone, Default)]
pub struct SelectionAggregator {
    /// Total selections
    pub total: u64,

    /// Selections that found a sample
    pub found: u64,

    /// Per-strategy miss counts
    pub misses: HashMap<String, u64>,

    /// Obsolete entries drained per successful selection
    pub obsolete_stats: RunningStats,

    /// Discovery cycle durations in milliseconds
    pub cycle_stats: RunningStats,
}

impl SelectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one selection outcome
    pub fn record_selection(&mut self, strategy: &str, found: bool, obsolete: usize) {
        self.total += 1;
        if found {
            self.found += 1;
            self.obsolete_stats.push(obsolete as f64);
        } else {
            *self.misses.entry(strategy.to_string()).or_insert(0) += 1;
        }
    }

    /// Add one discovery cycle duration
    pub fn record_cycle(&mut self, duration_ms: f64) {
        self.cycle_stats.push(duration_ms);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_selections: self.total,
            found_selections: self.found,
            hit_rate: if self.total > 0 {
                self.found as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            obsolete_entries: StatsSummary::from(&self.obsolete_stats),
            discovery_cycle_ms: StatsSummary::from(&self.cycle_stats),
            strategy_misses: self.misses.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_selections: u64,
    pub found_selections: u64,
    pub hit_rate: f64,
    pub obsolete_entries: StatsSummary,
    pub discovery_cycle_ms: StatsSummary,
    pub strategy_misses: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sigflow Summary ===")?;
        writeln!(
            f,
            "Selections: {} found of {} ({:.2}%)",
            self.found_selections, self.total_selections, self.hit_rate
        )?;
        writeln!(f, "Obsolete entries per selection: {}", self.obsolete_entries)?;
        writeln!(f, "Discovery cycle (ms): {}", self.discovery_cycle_ms)?;

        if !self.strategy_misses.is_empty() {
            writeln!(f, "Misses by strategy:")?;
            for (strategy, count) in &self.strategy_misses {
                writeln!(f, "  {}: {}", strategy, count)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
