//! TopicName - Cheap-to-clone bus topic identifier
//!
//! Uses Arc<str> internally for O(1) clone operations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Bus topic name with cheap cloning.
///
/// Topic names are created once when a topic is first observed and then cloned
/// into every queue, cache entry, log field and metric label that refers to it.
///
/// # Examples
/// ```
/// use contracts::TopicName;
///
/// let topic: TopicName = "sig:radar.front.objects".into();
/// let other = topic.clone();
/// assert_eq!(topic, other);
/// assert_eq!(topic.as_str(), "sig:radar.front.objects");
/// ```
#[derive(Clone, Default)]
pub struct TopicName(Arc<str>);

impl TopicName {
    /// Create a new TopicName from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Deref to &str for easy string operations
impl Deref for TopicName {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for TopicName {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TopicName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Conversions
impl From<&str> for TopicName {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TopicName {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<Arc<str>> for TopicName {
    #[inline]
    fn from(s: Arc<str>) -> Self {
        Self(s)
    }
}

// Display and Debug
impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicName({:?})", self.0)
    }
}

// Equality against plain strings
impl PartialEq for TopicName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for TopicName {}

impl PartialOrd for TopicName {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TopicName {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialEq<str> for TopicName {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for TopicName {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl PartialEq<String> for TopicName {
    #[inline]
    fn eq(&self, other: &String) -> bool {
        self.0.as_ref() == other
    }
}

// Hash must match str so `HashMap<TopicName, _>` can be queried with &str
impl Hash for TopicName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

// Serde support
impl Serialize for TopicName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TopicName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_clone_shares_storage() {
        let topic: TopicName = "sig:camera".into();
        let copy = topic.clone();

        assert_eq!(topic.as_str().as_ptr(), copy.as_str().as_ptr());
    }

    #[test]
    fn test_equality_with_strings() {
        let topic: TopicName = "sig:lidar".into();
        assert_eq!(topic, "sig:lidar");
        assert_eq!(topic, String::from("sig:lidar"));
        assert_eq!(topic, TopicName::from("sig:lidar"));
        assert_ne!(topic, TopicName::from("sig:radar"));
    }

    #[test]
    fn test_lookup_by_str() {
        let mut queues: HashMap<TopicName, usize> = HashMap::new();
        queues.insert("sig:a".into(), 1);
        queues.insert("sig:b".into(), 2);

        assert_eq!(queues.get("sig:a"), Some(&1));
        assert_eq!(queues.get("sig:b"), Some(&2));
        assert_eq!(queues.get("sig:c"), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let topic: TopicName = "sig:gps".into();
        let json = serde_json::to_string(&topic).unwrap();
        assert_eq!(json, "\"sig:gps\"");

        let parsed: TopicName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, topic);
    }
}
