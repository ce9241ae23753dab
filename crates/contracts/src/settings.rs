//! SigflowConfig - Config Loader output
//!
//! Catalog discovery timing, extraction queue defaults and logging settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SigflowConfig {
    /// Signal catalog discovery settings
    #[serde(default)]
    #[validate(nested)]
    pub catalog: CatalogConfig,

    /// Extraction router / topic queue defaults
    #[serde(default)]
    #[validate(nested)]
    pub extraction: ExtractionConfig,

    /// Logging and metrics export
    #[serde(default)]
    #[validate(nested)]
    pub observability: LoggingConfig,
}

/// Signal catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CatalogConfig {
    /// Only topics whose type name starts with this prefix are tracked
    #[validate(length(min = 1))]
    pub namespace_prefix: String,

    /// Discovery cycles a topic may go unobserved before eviction
    pub max_accepted_ticks: u32,

    /// Background poll interval in milliseconds
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,

    /// Tight-polling window after a change signal, in milliseconds
    pub settle_window_ms: u64,

    /// Sleep between tight polls, in milliseconds
    pub settle_loop_sleep_ms: u64,

    /// Identical consecutive list sizes required before a listing is trusted
    #[validate(range(min = 1))]
    pub stability_samples: u32,

    /// Stability samples used during the initial fill
    #[validate(range(min = 1))]
    pub initial_stability_samples: u32,

    /// Discovery rounds run on start before regular polling
    pub initial_fill_rounds: u32,

    /// How long `start` waits for the initial fill, in milliseconds
    pub initial_fill_timeout_ms: u64,

    /// Sleep between stability samples, in milliseconds
    pub sample_interval_ms: u64,

    /// Upper bound on samples per listing
    #[validate(range(min = 1))]
    pub max_sample_attempts: u32,

    /// Fetch full schemas during discovery instead of on first describe
    pub eager_schema_fetch: bool,

    /// Parallelise eager schema fetches
    pub parallel_fetch: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "sig:".to_string(),
            max_accepted_ticks: 40,
            poll_interval_ms: 500,
            settle_window_ms: 3000,
            settle_loop_sleep_ms: 50,
            stability_samples: 25,
            initial_stability_samples: 1,
            initial_fill_rounds: 15,
            initial_fill_timeout_ms: 5000,
            sample_interval_ms: 50,
            max_sample_attempts: 500,
            eager_schema_fetch: false,
            parallel_fetch: true,
        }
    }
}

impl CatalogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn settle_loop_sleep(&self) -> Duration {
        Duration::from_millis(self.settle_loop_sleep_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn initial_fill_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_fill_timeout_ms)
    }
}

/// Extraction defaults applied to newly created topic queues
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum history length per topic
    #[validate(range(min = 1))]
    pub max_history: usize,

    /// Convert and deliver on the pushing thread
    pub blocking: bool,

    /// Keep only the newest staged sample per worker round
    pub drop_extra_input: bool,

    /// Payloads larger than the declared size by less than this are trimmed
    pub size_diff_threshold: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            blocking: false,
            drop_extra_input: false,
            size_diff_threshold: 0,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatKind {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Logging and metrics export settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_format: LogFormatKind,

    /// Default filter when `RUST_LOG` is unset
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Prometheus port, `None` disables the exporter
    pub metrics_port: Option<u16>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormatKind::Json,
            log_level: "info".to_string(),
            metrics_port: Some(9000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.max_accepted_ticks, 40);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.settle_window(), Duration::from_secs(3));
        assert_eq!(config.stability_samples, 25);
        assert_eq!(config.max_sample_attempts, 500);
    }

    #[test]
    fn test_extraction_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.max_history, 20);
        assert!(!config.blocking);
        assert!(!config.drop_extra_input);
    }

    #[test]
    fn test_derived_validation_rejects_zero_history() {
        let mut config = SigflowConfig::default();
        assert!(config.validate().is_ok());

        config.extraction.max_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SigflowConfig =
            serde_json::from_str(r#"{ "catalog": { "max_accepted_ticks": 3 } }"#).unwrap();
        assert_eq!(config.catalog.max_accepted_ticks, 3);
        assert_eq!(config.catalog.namespace_prefix, "sig:");
        assert_eq!(config.extraction.max_history, 20);
    }
}
