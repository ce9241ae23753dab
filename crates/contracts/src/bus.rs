//! TopicBus trait - the distributed bus as seen by discovery
//!
//! The transport itself is external. The catalog only needs to list topics and
//! decode their descriptors in two phases.

use std::collections::HashMap;

use bytes::Bytes;

use crate::{BasicInfo, ContractError};

/// What the bus announces for one topic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMetadata {
    /// Declared type name; a change starts a new cache generation
    pub type_name: String,

    /// Bus-specific descriptor bytes; empty while no publisher has announced one
    pub descriptor: Bytes,
}

/// Bus collaborator used by the signal catalog
///
/// Listing may be partial or unstable on a single call; callers apply their own
/// stability filter.
///
/// # Example
///
/// ```ignore
/// let bus: Arc<dyn TopicBus> = Arc::new(MockBus::new());
/// let topics = bus.list_topics()?;
/// for (topic, meta) in &topics {
///     let info = bus.probe(topic, meta)?;
///     println!("{topic} -> {}", info.root_url());
/// }
/// ```
pub trait TopicBus: Send + Sync {
    /// List every topic currently visible on the bus
    fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>, ContractError>;

    /// Decode the header of a descriptor (phase one, cheap)
    fn probe(&self, topic: &str, metadata: &TopicMetadata) -> Result<BasicInfo, ContractError>;

    /// Fetch the full binary schema of a topic (phase two, may be slow)
    fn fetch_schema(&self, topic: &str, metadata: &TopicMetadata)
        -> Result<Bytes, ContractError>;
}
