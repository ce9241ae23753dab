//! Extractor error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// No queue exists for the topic
    #[error("no data for topic '{topic}'")]
    NotFound { topic: String },

    /// Synchronised read on a url without a sync config
    #[error("no sync config registered for '{url}'")]
    NoSyncConfig { url: String },

    /// Malformed struct version string passed to a setup call
    #[error("invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    /// Queue creation failed
    #[error("queue error: {0}")]
    Queue(#[from] ingestion::QueueError),

    /// Contract error, e.g. a malformed version string
    #[error(transparent)]
    Contract(contracts::ContractError),
}

impl From<contracts::ContractError> for ExtractorError {
    fn from(error: contracts::ContractError) -> Self {
        match error {
            contracts::ContractError::InvalidVersion { version, message } => {
                Self::InvalidVersion { version, message }
            }
            other => Self::Contract(other),
        }
    }
}

/// Extractor Result alias
pub type Result<T> = std::result::Result<T, ExtractorError>;
