//! Catalog cache state
//!
//! Everything the discovery worker learns lives here, behind the catalog's
//! single lock. No method in this module calls the bus or a user callback.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use contracts::{BasicInfo, SignalDescription, TopicMetadata, TopicName};
use tracing::debug;

use crate::ResolveCallback;

/// Discovery bookkeeping for one bus topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCacheEntry {
    /// Type name declared when the entry was created
    pub type_name: String,
    /// Root url, set once the descriptor was probed
    pub resolved_url: Option<String>,
    /// Cycles since the topic was last observed
    pub tick_count: u32,
}

impl TopicCacheEntry {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            resolved_url: None,
            tick_count: 0,
        }
    }
}

/// What is known about one root url
#[derive(Debug, Clone)]
pub(crate) struct RootRecord {
    pub topic: TopicName,
    pub basic_info: BasicInfo,
    pub metadata: TopicMetadata,
    /// Full schema, fetched lazily unless discovery is eager
    pub schema: Option<Bytes>,
}

impl RootRecord {
    pub fn description(&self) -> Option<SignalDescription> {
        self.schema.as_ref().map(|schema| SignalDescription {
            basic_info: self.basic_info.clone(),
            binary_schema: schema.clone(),
        })
    }
}

pub(crate) struct PendingResolution {
    pub id: u64,
    pub callback: ResolveCallback,
}

/// A registration whose url became available
pub(crate) struct FiredResolution {
    pub url: String,
    pub root_url: String,
    pub id: u64,
    pub callback: ResolveCallback,
}

#[derive(Default)]
pub(crate) struct CatalogCache {
    pub entries: HashMap<String, TopicCacheEntry>,
    /// Root url -> record, ordered for stable listings
    pub roots: BTreeMap<String, RootRecord>,
    /// Memoised url -> root url lookups
    pub url_cache: HashMap<String, String>,
    /// Topic -> urls memoised for it, cleared on eviction
    pub topic_urls: HashMap<String, Vec<String>>,
    /// Waiting registrations keyed by url
    pub pending: HashMap<String, Vec<PendingResolution>>,
    /// Registration id -> url, for cancellation
    pub pending_ids: HashMap<u64, String>,
}

impl CatalogCache {
    /// Remove a topic and everything derived from it
    pub fn evict_topic(&mut self, topic: &str) -> bool {
        let Some(entry) = self.entries.remove(topic) else {
            return false;
        };

        if let Some(root) = entry.resolved_url {
            if self
                .roots
                .get(&root)
                .is_some_and(|record| record.topic == topic)
            {
                self.roots.remove(&root);
            }
        }

        for url in self.topic_urls.remove(topic).unwrap_or_default() {
            self.url_cache.remove(&url);
        }

        debug!(topic = %topic, "topic evicted");
        true
    }

    /// Evict every entry whose tick exceeds `max_ticks`, returns the evicted topics
    pub fn evict_stale(&mut self, max_ticks: u32) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.tick_count > max_ticks)
            .map(|(topic, _)| topic.clone())
            .collect();

        for topic in &stale {
            self.evict_topic(topic);
        }
        stale
    }

    /// Record the probed root url of a topic
    ///
    /// Ignored if the entry disappeared or changed generation meanwhile.
    pub fn insert_root(
        &mut self,
        topic: &str,
        metadata: TopicMetadata,
        basic_info: BasicInfo,
        schema: Option<Bytes>,
    ) -> Option<String> {
        let root_url = basic_info.root_url();
        let entry = self.entries.get_mut(topic)?;
        if entry.type_name != metadata.type_name || root_url.is_empty() {
            return None;
        }

        entry.resolved_url = Some(root_url.clone());
        self.roots.insert(
            root_url.clone(),
            RootRecord {
                topic: TopicName::from(topic),
                basic_info,
                metadata,
                schema,
            },
        );
        Some(root_url)
    }

    pub fn add_pending(&mut self, id: u64, url: &str, callback: ResolveCallback) {
        self.pending
            .entry(url.to_string())
            .or_default()
            .push(PendingResolution { id, callback });
        self.pending_ids.insert(id, url.to_string());
    }

    /// Remove registrations by id, returns how many were still pending
    pub fn cancel_pending(&mut self, ids: &[u64]) -> usize {
        let mut removed = 0;
        for id in ids {
            let Some(url) = self.pending_ids.remove(id) else {
                continue;
            };
            if let Some(list) = self.pending.get_mut(&url) {
                let before = list.len();
                list.retain(|pending| pending.id != *id);
                removed += before - list.len();
                if list.is_empty() {
                    self.pending.remove(&url);
                }
            }
        }
        removed
    }

    /// Take every registration whose url now resolves
    pub fn drain_resolvable(&mut self) -> Vec<FiredResolution> {
        let urls: Vec<String> = self.pending.keys().cloned().collect();
        let mut fired = Vec::new();

        for url in urls {
            let Some(root_url) = self.resolve_root(&url) else {
                continue;
            };
            for pending in self.pending.remove(&url).unwrap_or_default() {
                self.pending_ids.remove(&pending.id);
                fired.push(FiredResolution {
                    url: url.clone(),
                    root_url: root_url.clone(),
                    id: pending.id,
                    callback: pending.callback,
                });
            }
        }

        // Fire in registration order
        fired.sort_by_key(|resolution| resolution.id);
        fired
    }

    pub fn pending_count(&self) -> usize {
        self.pending_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(type_name: &str) -> TopicMetadata {
        TopicMetadata {
            type_name: type_name.to_string(),
            descriptor: Bytes::from_static(b"x"),
        }
    }

    fn info(device: &str, view: &str, group: &str) -> BasicInfo {
        BasicInfo {
            device_name: device.into(),
            view_name: view.into(),
            group_name: group.into(),
            ..Default::default()
        }
    }

    fn cache_with(topic: &str, root: (&str, &str, &str)) -> CatalogCache {
        let mut cache = CatalogCache::default();
        cache
            .entries
            .insert(topic.to_string(), TopicCacheEntry::new("sig:type"));
        cache.insert_root(topic, meta("sig:type"), info(root.0, root.1, root.2), None);
        cache
    }

    #[test]
    fn test_insert_root_sets_resolved_url() {
        let cache = cache_with("t1", ("radar", "front", "objects"));
        assert_eq!(
            cache.entries["t1"].resolved_url.as_deref(),
            Some("radar.front.objects")
        );
        assert_eq!(cache.roots["radar.front.objects"].topic, "t1");
    }

    #[test]
    fn test_insert_root_ignores_other_generation() {
        let mut cache = CatalogCache::default();
        cache
            .entries
            .insert("t1".to_string(), TopicCacheEntry::new("sig:new"));
        let root = cache.insert_root("t1", meta("sig:old"), info("a", "b", "c"), None);

        assert!(root.is_none());
        assert!(cache.roots.is_empty());
    }

    #[test]
    fn test_evict_clears_url_cache() {
        let mut cache = cache_with("t1", ("radar", "front", "objects"));
        assert!(cache.resolve_root("radar.front.objects.count").is_some());
        assert!(cache.url_cache.contains_key("radar.front.objects.count"));

        assert!(cache.evict_topic("t1"));
        assert!(cache.roots.is_empty());
        assert!(cache.url_cache.is_empty());
        assert!(!cache.evict_topic("t1"));
    }

    #[test]
    fn test_evict_stale_uses_strict_threshold() {
        let mut cache = cache_with("t1", ("a", "b", "c"));
        cache.entries.get_mut("t1").unwrap().tick_count = 2;
        assert!(cache.evict_stale(2).is_empty());

        cache.entries.get_mut("t1").unwrap().tick_count = 3;
        assert_eq!(cache.evict_stale(2), vec!["t1".to_string()]);
    }

    #[test]
    fn test_cancel_pending() {
        let mut cache = CatalogCache::default();
        cache.add_pending(1, "a.b.c", Box::new(|_| {}));
        cache.add_pending(2, "a.b.c", Box::new(|_| {}));

        assert_eq!(cache.cancel_pending(&[1, 99]), 1);
        assert_eq!(cache.pending_count(), 1);
        assert_eq!(cache.cancel_pending(&[1]), 0);
        assert_eq!(cache.cancel_pending(&[2]), 1);
        assert!(cache.pending.is_empty());
    }

    #[test]
    fn test_drain_resolvable_takes_only_available_urls() {
        let mut cache = cache_with("t1", ("radar", "front", "objects"));
        cache.add_pending(1, "radar.front.objects.count", Box::new(|_| {}));
        cache.add_pending(2, "lidar.top.points", Box::new(|_| {}));

        let fired = cache.drain_resolvable();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, 1);
        assert_eq!(fired[0].root_url, "radar.front.objects");
        assert_eq!(cache.pending_count(), 1);
    }
}
