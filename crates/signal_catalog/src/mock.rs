//! In-memory bus
//!
//! Stands in for the distributed bus in tests and demos. Supports injecting
//! unstable listings and malformed descriptors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use contracts::{BasicInfo, ContractError, TopicBus, TopicMetadata};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Descriptor layout used by the mock bus
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockDescriptor {
    info: BasicInfo,
    schema: Vec<u8>,
}

/// In-memory `TopicBus`
#[derive(Debug, Default)]
pub struct MockBus {
    topics: Mutex<HashMap<String, TopicMetadata>>,
    /// Listings left that return only part of the topics
    partial_listings: AtomicUsize,
    list_calls: AtomicU64,
    probe_calls: AtomicU64,
    schema_calls: AtomicU64,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce a topic with a decodable descriptor
    pub fn publish(
        &self,
        topic: &str,
        type_name: &str,
        info: BasicInfo,
        schema: impl Into<Vec<u8>>,
    ) -> Result<(), ContractError> {
        let descriptor = MockDescriptor {
            info,
            schema: schema.into(),
        };
        let bytes = serde_json::to_vec(&descriptor)
            .map_err(|e| ContractError::bus(format!("encode descriptor: {e}")))?;
        self.publish_raw(topic, type_name, Bytes::from(bytes));
        Ok(())
    }

    /// Announce a topic with arbitrary descriptor bytes
    ///
    /// Empty bytes model a subscriber that appeared before its publisher.
    pub fn publish_raw(&self, topic: &str, type_name: &str, descriptor: Bytes) {
        self.topics.lock().insert(
            topic.to_string(),
            TopicMetadata {
                type_name: type_name.to_string(),
                descriptor,
            },
        );
    }

    pub fn remove(&self, topic: &str) -> bool {
        self.topics.lock().remove(topic).is_some()
    }

    /// Make the next `count` listings return only half of the topics
    pub fn inject_partial_listings(&self, count: usize) {
        self.partial_listings.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u64 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn schema_calls(&self) -> u64 {
        self.schema_calls.load(Ordering::SeqCst)
    }

    fn decode(topic: &str, metadata: &TopicMetadata) -> Result<MockDescriptor, ContractError> {
        if metadata.descriptor.is_empty() {
            return Err(ContractError::schema_unavailable(topic, "empty descriptor"));
        }
        serde_json::from_slice(&metadata.descriptor)
            .map_err(|e| ContractError::schema_unavailable(topic, e.to_string()))
    }
}

impl TopicBus for MockBus {
    fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>, ContractError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let topics = self.topics.lock().clone();

        let partial = self
            .partial_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if partial {
            let keep = topics.len() / 2;
            return Ok(topics.into_iter().take(keep).collect());
        }
        Ok(topics)
    }

    #[instrument(name = "mock_bus_probe", skip(self, metadata), fields(topic = %topic))]
    fn probe(&self, topic: &str, metadata: &TopicMetadata) -> Result<BasicInfo, ContractError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::decode(topic, metadata)?.info)
    }

    #[instrument(name = "mock_bus_fetch_schema", skip(self, metadata), fields(topic = %topic))]
    fn fetch_schema(&self, topic: &str, metadata: &TopicMetadata) -> Result<Bytes, ContractError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(Self::decode(topic, metadata)?.schema))
    }
}
