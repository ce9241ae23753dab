//! Url -> topic lookups the router depends on

use contracts::{SignalDescription, TopicName};
use signal_catalog::SignalCatalog;

/// Source of url-to-topic mappings and topic descriptions
pub trait UrlDirectory: Send + Sync {
    /// Topic carrying `url`
    fn resolve_topic(&self, url: &str) -> Option<TopicName>;

    /// Root url of a topic
    fn root_url(&self, topic: &str) -> Option<String>;

    /// Description of the topic carrying `url`
    fn describe(&self, url: &str) -> Option<SignalDescription>;
}

impl UrlDirectory for SignalCatalog {
    fn resolve_topic(&self, url: &str) -> Option<TopicName> {
        SignalCatalog::resolve_topic(self, url)
    }

    fn root_url(&self, topic: &str) -> Option<String> {
        SignalCatalog::root_url(self, topic)
    }

    fn describe(&self, url: &str) -> Option<SignalDescription> {
        SignalCatalog::describe(self, url)
    }
}
