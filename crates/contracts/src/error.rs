//! Layered error definitions
//!
//! Categorized by source: config / bus / schema / conversion / layout

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Malformed struct version string passed to a setup call
    #[error("invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    // ===== Bus Errors =====
    /// Bus query failed
    #[error("bus error: {message}")]
    Bus { message: String },

    /// Topic description missing or malformed
    #[error("schema unavailable for topic '{topic}': {message}")]
    SchemaUnavailable { topic: String, message: String },

    // ===== Extraction Errors =====
    /// Raw payload conversion failed
    #[error("conversion failed for topic '{topic}': {message}")]
    Conversion { topic: String, message: String },

    /// Requested type does not fit the resolved field layout
    #[error("layout mismatch for '{url}': {message}")]
    LayoutMismatch { url: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid version error
    pub fn invalid_version(version: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Create bus error
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus {
            message: message.into(),
        }
    }

    /// Create schema unavailable error
    pub fn schema_unavailable(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaUnavailable {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create conversion error
    pub fn conversion(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create layout mismatch error
    pub fn layout_mismatch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LayoutMismatch {
            url: url.into(),
            message: message.into(),
        }
    }
}
