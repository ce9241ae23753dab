//! TopicQueue error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue is shutting down and no longer accepts samples
    #[error("queue for topic {topic} is terminating")]
    Terminated {
        /// Topic name
        topic: String,
    },

    /// Worker thread could not be started
    #[error("failed to spawn worker for topic {topic}: {source}")]
    Spawn {
        /// Topic name
        topic: String,
        #[source]
        source: std::io::Error,
    },
}

/// Queue Result alias
pub type Result<T> = std::result::Result<T, QueueError>;
