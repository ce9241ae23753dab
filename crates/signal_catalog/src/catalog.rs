//! SignalCatalog - topic discovery and metadata cache

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    CancellationToken, CatalogConfig, FormatType, SignalDescription, TopicBus, TopicName,
};
use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CatalogCache, TopicCacheEntry};
use crate::discovery::Control;
use crate::error::{CatalogError, Result};
use crate::hierarchy::{ChildInfo, HierarchyLevel};
use crate::metrics::{CatalogMetrics, CatalogMetricsSnapshot};

/// Payload handed to a `resolve_when_available` callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSignal {
    /// Url the callback was registered for
    pub url: String,
    pub topic: TopicName,
    pub description: SignalDescription,
}

/// One-shot resolution callback
pub type ResolveCallback = Box<dyn FnOnce(ResolvedSignal) + Send>;

pub(crate) struct CatalogInner {
    pub bus: Arc<dyn TopicBus>,
    pub config: CatalogConfig,
    max_ticks: AtomicU32,
    pub cache: Mutex<CatalogCache>,
    pub metrics: CatalogMetrics,
    pub token: CancellationToken,
    next_id: AtomicU64,
    pub settle_until: Mutex<Option<Instant>>,
    ready: Mutex<bool>,
    ready_cond: Condvar,
}

impl CatalogInner {
    pub(crate) fn max_ticks(&self) -> u32 {
        self.max_ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_ready(&self) {
        *self.ready.lock() = true;
        self.ready_cond.notify_all();
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ready = self.ready.lock();
        while !*ready {
            if self.ready_cond.wait_until(&mut ready, deadline).timed_out() {
                break;
            }
        }
        *ready
    }

    /// Description of a root url, fetching the schema on first access
    fn describe_root(&self, root_url: &str) -> Option<(TopicName, SignalDescription)> {
        let (topic, basic_info, metadata) = {
            let cache = self.cache.lock();
            let record = cache.roots.get(root_url)?;
            if let Some(description) = record.description() {
                return Some((record.topic.clone(), description));
            }
            (
                record.topic.clone(),
                record.basic_info.clone(),
                record.metadata.clone(),
            )
        };

        match self.bus.fetch_schema(&topic, &metadata) {
            Ok(schema) => {
                if let Some(record) = self.cache.lock().roots.get_mut(root_url) {
                    if record.topic == topic && record.schema.is_none() {
                        record.schema = Some(schema.clone());
                    }
                }
                Some((
                    topic,
                    SignalDescription {
                        basic_info,
                        binary_schema: schema,
                    },
                ))
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "schema fetch failed");
                self.metrics.record_schema_failure();
                None
            }
        }
    }

    /// Invoke a resolution callback for `url`
    ///
    /// Falls back to the header-only description when the schema cannot be
    /// fetched. If the root vanished meanwhile the registration goes back to
    /// pending.
    pub(crate) fn fire(&self, id: u64, url: String, root_url: &str, callback: ResolveCallback) {
        let resolved = self.describe_root(root_url).or_else(|| {
            let cache = self.cache.lock();
            cache.roots.get(root_url).map(|record| {
                (
                    record.topic.clone(),
                    SignalDescription {
                        basic_info: record.basic_info.clone(),
                        binary_schema: Bytes::new(),
                    },
                )
            })
        });

        let Some((topic, description)) = resolved else {
            debug!(url = %url, id, "root disappeared before firing, re-queued");
            self.cache.lock().add_pending(id, &url, callback);
            return;
        };

        debug!(url = %url, topic = %topic, id, "resolution fired");
        self.metrics.record_resolution_fired();
        observability::record_resolutions_fired(1);
        callback(ResolvedSignal {
            url,
            topic,
            description,
        });
    }
}

/// Cloneable handle for out-of-band change signals
///
/// Held by the bus layer; safe to use after the catalog is gone.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    control: Sender<Control>,
}

impl ChangeNotifier {
    /// A producer announced a registration change
    pub fn topics_changed(&self) {
        let _ = self.control.send(Control::TopicsChanged);
    }

    /// Topics reported gone by the bus layer
    pub fn invalidate(&self, topics: Vec<String>) {
        let _ = self.control.send(Control::InvalidateTopics(topics));
    }
}

/// Eventually consistent view of the topics on the bus
///
/// Construction starts the discovery worker and waits (bounded) for the
/// initial fill. Dropping the catalog stops and joins the worker.
///
/// # Example
///
/// ```ignore
/// let catalog = SignalCatalog::start(bus, CatalogConfig::default())?;
///
/// catalog.resolve_when_available("radar.front.objects", Box::new(|signal| {
///     println!("{} is on {}", signal.url, signal.topic);
/// }));
/// ```
pub struct SignalCatalog {
    inner: Arc<CatalogInner>,
    control: Sender<Control>,
    worker: Option<JoinHandle<()>>,
}

impl SignalCatalog {
    /// Start discovery on `bus`
    #[instrument(name = "signal_catalog_start", skip(bus, config), fields(prefix = %config.namespace_prefix))]
    pub fn start(bus: Arc<dyn TopicBus>, config: CatalogConfig) -> Result<Self> {
        let (control, receiver) = unbounded();
        let fill_timeout = config.initial_fill_timeout();

        let inner = Arc::new(CatalogInner {
            bus,
            max_ticks: AtomicU32::new(config.max_accepted_ticks),
            config,
            cache: Mutex::new(CatalogCache::default()),
            metrics: CatalogMetrics::new(),
            token: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            settle_until: Mutex::new(None),
            ready: Mutex::new(false),
            ready_cond: Condvar::new(),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("sigflow-catalog".to_string())
            .spawn(move || worker_inner.run(receiver))
            .map_err(CatalogError::Spawn)?;

        let catalog = Self {
            inner,
            control,
            worker: Some(worker),
        };

        if catalog.inner.wait_ready(fill_timeout) {
            info!(topics = catalog.topic_count(), "signal catalog ready");
        } else {
            warn!(
                timeout_ms = fill_timeout.as_millis() as u64,
                "initial fill still running, continuing"
            );
        }
        Ok(catalog)
    }

    /// Whether `url` resolves to a known topic, never blocks on the bus
    pub fn check_available(&self, url: &str) -> bool {
        self.inner.cache.lock().resolve_root(url).is_some()
    }

    /// Description of the topic carrying `url`
    ///
    /// The first call for a topic fetches its schema from the bus unless
    /// discovery already did.
    pub fn describe(&self, url: &str) -> Option<SignalDescription> {
        let root_url = self.inner.cache.lock().resolve_root(url)?;
        self.inner
            .describe_root(&root_url)
            .map(|(_, description)| description)
    }

    /// Invoke `callback` once `url` is available
    ///
    /// Fires synchronously when it already is; otherwise on the discovery
    /// worker the first time it becomes available. Returns an id for
    /// `cancel_resolutions`.
    pub fn resolve_when_available(&self, url: &str, callback: ResolveCallback) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let root_url = {
            let mut cache = self.inner.cache.lock();
            match cache.resolve_root(url) {
                Some(root_url) => root_url,
                None => {
                    debug!(url = %url, id, "resolution pending");
                    cache.add_pending(id, url, callback);
                    return id;
                }
            }
        };

        self.inner.fire(id, url.to_string(), &root_url, callback);
        id
    }

    /// Drop pending registrations; ids already fired or unknown are ignored
    pub fn cancel_resolutions(&self, ids: &[u64]) -> usize {
        self.inner.cache.lock().cancel_pending(ids)
    }

    pub fn pending_resolutions(&self) -> usize {
        self.inner.cache.lock().pending_count()
    }

    pub fn list_children(&self, level: HierarchyLevel, parent_url: &str) -> Vec<ChildInfo> {
        self.inner.cache.lock().list_children(level, parent_url)
    }

    /// Listing one level below `url`; empty url lists devices
    pub fn children_of(&self, url: &str) -> Vec<ChildInfo> {
        self.inner.cache.lock().children_of(url)
    }

    /// Root urls containing `keyword`, case-insensitive
    pub fn search(&self, keyword: &str) -> Vec<String> {
        self.inner.cache.lock().search(keyword)
    }

    pub fn devices_by_format(&self, format_type: FormatType) -> Vec<String> {
        self.inner.cache.lock().devices_by_format(format_type)
    }

    pub fn full_url_tree(&self) -> HashMap<String, Vec<String>> {
        self.inner.cache.lock().full_url_tree()
    }

    /// Topic carrying `url`
    pub fn resolve_topic(&self, url: &str) -> Option<TopicName> {
        let mut cache = self.inner.cache.lock();
        let root_url = cache.resolve_root(url)?;
        cache.roots.get(&root_url).map(|record| record.topic.clone())
    }

    /// Topic whose root url is exactly `root_url`
    pub fn topic_name(&self, root_url: &str) -> Option<TopicName> {
        self.inner
            .cache
            .lock()
            .roots
            .get(root_url)
            .map(|record| record.topic.clone())
    }

    /// Root url of a topic, once probed
    pub fn root_url(&self, topic: &str) -> Option<String> {
        self.inner
            .cache
            .lock()
            .entries
            .get(topic)
            .and_then(|entry| entry.resolved_url.clone())
    }

    pub fn entry(&self, topic: &str) -> Option<TopicCacheEntry> {
        self.inner.cache.lock().entries.get(topic).cloned()
    }

    /// Remove topics the bus layer reported gone
    pub fn invalidate_topics(&self, topics: &[String]) -> usize {
        self.inner.invalidate(topics)
    }

    /// Wake the worker and open the settle window
    pub fn notify_topics_changed(&self) {
        self.inner.open_settle_window();
        let _ = self.control.send(Control::TopicsChanged);
    }

    pub fn change_notifier(&self) -> ChangeNotifier {
        ChangeNotifier {
            control: self.control.clone(),
        }
    }

    /// Change the staleness threshold
    pub fn set_max_ticks(&self, max_ticks: u32) {
        self.inner.max_ticks.store(max_ticks, Ordering::Relaxed);
    }

    pub fn topic_count(&self) -> usize {
        self.inner.cache.lock().entries.len()
    }

    pub fn metrics(&self) -> CatalogMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stop and join the discovery worker
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.inner.token.cancel();
        let _ = self.control.send(Control::Shutdown);

        if worker.join().is_err() {
            error!("discovery worker panicked");
        }
        debug!("signal catalog shut down");
    }
}

impl Drop for SignalCatalog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockBus;
    use contracts::BasicInfo;
    use std::sync::atomic::AtomicUsize;

    fn config() -> CatalogConfig {
        CatalogConfig {
            poll_interval_ms: 10,
            settle_window_ms: 50,
            settle_loop_sleep_ms: 5,
            stability_samples: 1,
            initial_stability_samples: 1,
            initial_fill_rounds: 2,
            sample_interval_ms: 1,
            max_sample_attempts: 20,
            ..Default::default()
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

    fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn test_initial_fill_discovers_topics() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![9])
            .unwrap();
        bus.publish("other", "foreign:type", info("x", "y", "z"), vec![])
            .unwrap();

        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();

        assert!(catalog.check_available("radar.front.objects.count"));
        assert!(!catalog.check_available("x.y.z"));
        assert_eq!(catalog.topic_count(), 1);
        assert_eq!(
            catalog.resolve_topic("radar.front.objects.count").as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn test_describe_fetches_schema_lazily() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![1, 2])
            .unwrap();
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();
        assert_eq!(bus.schema_calls(), 0);

        let description = catalog.describe("radar.front.objects").unwrap();
        assert_eq!(description.binary_schema.as_ref(), &[1, 2]);
        assert_eq!(description.basic_info.device_name, "radar");

        catalog.describe("radar.front.objects").unwrap();
        assert_eq!(bus.schema_calls(), 1);
        assert!(catalog.describe("lidar.top").is_none());
    }

    #[test]
    fn test_eager_fetch_fills_schema_during_discovery() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![3])
            .unwrap();
        let catalog = SignalCatalog::start(
            bus.clone(),
            CatalogConfig {
                eager_schema_fetch: true,
                ..config()
            },
        )
        .unwrap();

        let calls = bus.schema_calls();
        assert!(calls >= 1);
        catalog.describe("radar.front.objects").unwrap();
        assert_eq!(bus.schema_calls(), calls);
    }

    #[test]
    fn test_resolve_after_observation_fires_synchronously() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        let catalog = SignalCatalog::start(bus, config()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        catalog.resolve_when_available(
            "radar.front.objects.count",
            Box::new(move |signal| {
                assert_eq!(signal.url, "radar.front.objects.count");
                assert_eq!(signal.topic, "t1");
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.pending_resolutions(), 0);
    }

    #[test]
    fn test_resolve_before_observation_fires_once_on_discovery() {
        let bus = Arc::new(MockBus::new());
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&hits);
        let second = Arc::clone(&hits);
        catalog.resolve_when_available(
            "radar.front.objects",
            Box::new(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            }),
        );
        catalog.resolve_when_available(
            "radar.front.objects.count",
            Box::new(move |_| {
                second.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(catalog.pending_resolutions(), 2);

        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            hits.load(Ordering::SeqCst) == 2
        }));

        // Later cycles never fire again
        thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.metrics().resolutions_fired, 2);
    }

    #[test]
    fn test_cancelled_resolution_never_fires() {
        let bus = Arc::new(MockBus::new());
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = catalog.resolve_when_available(
            "radar.front.objects",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(catalog.cancel_resolutions(&[id, 12345]), 1);

        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            catalog.check_available("radar.front.objects")
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_topic_is_evicted() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();
        catalog.set_max_ticks(2);
        assert!(catalog.check_available("radar.front.objects"));

        bus.remove("t1");
        assert!(wait_until(Duration::from_secs(3), || {
            !catalog.check_available("radar.front.objects")
        }));
        assert!(catalog.entry("t1").is_none());
        assert!(catalog.metrics().evictions >= 1);
    }

    #[test]
    fn test_type_change_starts_new_generation() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:v1", info("radar", "front", "objects"), vec![])
            .unwrap();
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();
        assert_eq!(catalog.root_url("t1").as_deref(), Some("radar.front.objects"));

        bus.publish("t1", "sig:v2", info("radar", "front", "tracks"), vec![])
            .unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            catalog.root_url("t1").as_deref() == Some("radar.front.tracks")
        }));
        assert!(!catalog.check_available("radar.front.objects.count"));
        assert_eq!(catalog.entry("t1").unwrap().type_name, "sig:v2");
    }

    #[test]
    fn test_malformed_descriptor_is_retried() {
        let bus = Arc::new(MockBus::new());
        bus.publish_raw("t1", "sig:objects", Bytes::from_static(b"{broken"));
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();

        assert!(catalog.metrics().schema_failures >= 1);
        assert!(catalog.entry("t1").is_some_and(|e| e.resolved_url.is_none()));

        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            catalog.check_available("radar.front.objects")
        }));
    }

    #[test]
    fn test_invalidate_topics() {
        let bus = Arc::new(MockBus::new());
        bus.publish("t1", "sig:objects", info("radar", "front", "objects"), vec![])
            .unwrap();
        let catalog = SignalCatalog::start(bus.clone(), config()).unwrap();

        bus.remove("t1");
        assert_eq!(catalog.invalidate_topics(&["t1".to_string()]), 1);
        assert!(!catalog.check_available("radar.front.objects"));
    }

    #[test]
    fn test_change_notifier_outlives_catalog() {
        let bus = Arc::new(MockBus::new());
        let catalog = SignalCatalog::start(bus, config()).unwrap();
        let notifier = catalog.change_notifier();
        notifier.topics_changed();
        drop(catalog);
        notifier.topics_changed();
        notifier.invalidate(vec!["t1".to_string()]);
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let bus = Arc::new(MockBus::new());
        let mut catalog = SignalCatalog::start(
            bus,
            CatalogConfig {
                poll_interval_ms: 60_000,
                ..config()
            },
        )
        .unwrap();

        let started = Instant::now();
        catalog.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
