//! # Ingestion
//!
//! Per-topic buffered conversion.
//!
//! Responsibilities:
//! - Copy raw samples off the bus and stage them per topic
//! - Convert through the `LayoutResolver`, trimming small padding
//! - Keep a bounded history, evicting the oldest entry first
//! - Deliver to registered callbacks in push order
//!
//! ## Usage
//!
//! ```ignore
//! use ingestion::{QueueSettings, TopicQueue};
//!
//! let queue = TopicQueue::new(topic, resolver, package, schema, QueueSettings::default())?;
//! queue.push(RawSample::copy_from(topic.clone(), &payload, timestamp));
//!
//! for sample in queue.pull_history() {
//!     // ...
//! }
//! ```

mod config;
mod convert;
mod error;
mod queue;

pub use config::{QueueMetrics, QueueMetricsSnapshot, QueueSettings};
pub use contracts::{ExtractedSample, RawSample};
pub use convert::adapt_size;
pub use error::{QueueError, Result};
pub use queue::{CallbackRegistration, QueueCallback, TopicQueue};
