//! Device / view / group listings derived from cached root urls

use std::collections::{BTreeMap, HashMap};

use contracts::FormatType;
use serde::{Deserialize, Serialize};

use crate::cache::CatalogCache;
use crate::resolve::strip_indices;

/// Hierarchy level of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Device,
    View,
    Group,
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInfo {
    pub name: String,
    /// Number of cached children under this name
    pub child_count: usize,
    /// Groups and views are treated as single elements
    pub array_length: usize,
}

/// Collapse (key, value) pairs into child infos, first-seen order
fn collapse(pairs: Vec<(String, String)>) -> Vec<ChildInfo> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for (key, _) in pairs {
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    order
        .into_iter()
        .map(|name| ChildInfo {
            child_count: counts.get(&name).copied().unwrap_or(0),
            name,
            array_length: 1,
        })
        .collect()
}

impl CatalogCache {
    pub(crate) fn list_children(&self, level: HierarchyLevel, parent_url: &str) -> Vec<ChildInfo> {
        let mut pairs: Vec<(String, String)> = Vec::new();

        for (root_url, record) in &self.roots {
            let device = &record.basic_info.device_name;
            let view = &record.basic_info.view_name;
            if device.is_empty() {
                continue;
            }

            match level {
                HierarchyLevel::Device => {
                    if !pairs.iter().any(|(d, v)| d == device && v == view) {
                        pairs.push((device.clone(), view.clone()));
                    }
                }
                HierarchyLevel::View => {
                    if device == parent_url {
                        pairs.push((view.clone(), root_url.clone()));
                    }
                }
                HierarchyLevel::Group => {
                    let device_and_view = format!("{device}.{view}");
                    if device_and_view == parent_url || root_url == parent_url {
                        pairs.push((root_url.clone(), root_url.clone()));
                    } else if parent_url.contains(root_url.as_str()) {
                        pairs.push((parent_url.to_string(), root_url.clone()));
                    }
                }
            }
        }

        collapse(pairs)
    }

    /// Listing one level below `url`
    pub(crate) fn children_of(&self, url: &str) -> Vec<ChildInfo> {
        if url.is_empty() {
            return self.list_children(HierarchyLevel::Device, "");
        }

        let url = strip_indices(url);
        if !url.contains('.') {
            return self.list_children(HierarchyLevel::View, &url);
        }
        self.list_children(HierarchyLevel::Group, &url)
    }

    /// Root urls containing `keyword`, case-insensitive
    pub(crate) fn search(&self, keyword: &str) -> Vec<String> {
        let keyword = keyword.to_lowercase();
        self.roots
            .keys()
            .filter(|root| root.to_lowercase().contains(&keyword))
            .cloned()
            .collect()
    }

    pub(crate) fn devices_by_format(&self, format_type: FormatType) -> Vec<String> {
        let mut devices: Vec<String> = Vec::new();
        for record in self.roots.values() {
            let device = &record.basic_info.device_name;
            if record.basic_info.format_type == format_type
                && !device.is_empty()
                && !devices.contains(device)
            {
                devices.push(device.clone());
            }
        }
        devices
    }

    /// Device -> every root url under it
    pub(crate) fn full_url_tree(&self) -> HashMap<String, Vec<String>> {
        let mut tree: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (root_url, record) in &self.roots {
            if record.basic_info.device_name.is_empty() {
                continue;
            }
            tree.entry(record.basic_info.device_name.clone())
                .or_default()
                .push(root_url.clone());
        }
        tree.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TopicCacheEntry;
    use bytes::Bytes;
    use contracts::{BasicInfo, TopicMetadata};

    fn cache() -> CatalogCache {
        let mut cache = CatalogCache::default();
        let roots = [
            ("t1", "radar", "front", "objects", FormatType::Can),
            ("t2", "radar", "front", "tracks", FormatType::Can),
            ("t3", "radar", "rear", "objects", FormatType::Can),
            ("t4", "camera", "mono", "image", FormatType::Refcam),
        ];
        for (topic, device, view, group, format_type) in roots {
            cache
                .entries
                .insert(topic.to_string(), TopicCacheEntry::new("sig:t"));
            let info = BasicInfo {
                device_name: device.into(),
                view_name: view.into(),
                group_name: group.into(),
                format_type,
                ..Default::default()
            };
            let meta = TopicMetadata {
                type_name: "sig:t".into(),
                descriptor: Bytes::from_static(b"d"),
            };
            cache.insert_root(topic, meta, info, None);
        }
        cache
    }

    #[test]
    fn test_device_level_counts_views() {
        let children = cache().children_of("");
        let radar = children.iter().find(|c| c.name == "radar").unwrap();
        let camera = children.iter().find(|c| c.name == "camera").unwrap();

        assert_eq!(children.len(), 2);
        assert_eq!(radar.child_count, 2);
        assert_eq!(camera.child_count, 1);
        assert_eq!(radar.array_length, 1);
    }

    #[test]
    fn test_view_level_counts_groups() {
        let children = cache().children_of("radar");
        let front = children.iter().find(|c| c.name == "front").unwrap();
        let rear = children.iter().find(|c| c.name == "rear").unwrap();

        assert_eq!(front.child_count, 2);
        assert_eq!(rear.child_count, 1);
    }

    #[test]
    fn test_group_level_lists_roots() {
        let names: Vec<String> = cache()
            .children_of("radar.front")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["radar.front.objects", "radar.front.tracks"]);
    }

    #[test]
    fn test_group_level_below_root() {
        let children = cache().children_of("radar.front.objects.list[0]");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "radar.front.objects.list");
    }

    #[test]
    fn test_search_is_case_insensitive() {
        assert_eq!(
            cache().search("OBJECTS"),
            vec!["radar.front.objects", "radar.rear.objects"]
        );
        assert!(cache().search("lidar").is_empty());
    }

    #[test]
    fn test_devices_by_format_unique() {
        assert_eq!(cache().devices_by_format(FormatType::Can), vec!["radar"]);
        assert_eq!(cache().devices_by_format(FormatType::Refcam), vec!["camera"]);
        assert!(cache().devices_by_format(FormatType::Xcp).is_empty());
    }

    #[test]
    fn test_full_url_tree() {
        let tree = cache().full_url_tree();
        assert_eq!(tree["radar"].len(), 3);
        assert_eq!(tree["camera"], vec!["camera.mono.image"]);
    }
}
