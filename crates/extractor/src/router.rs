//! Extraction router
//!
//! Maps urls to topics and topics to queues. Queue handles are cloned out of
//! the router lock before any queue operation, so a callback running on a queue
//! worker can call back into the router.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    ExtractedSample, ExtractionConfig, FieldLayout, FormatType, LayoutResolver, PackageInfo,
    RawSample, ScalarType, SignalDescription, SignalValue, StructTarget, SyncConfig,
    SyncStrategyKind, SyncValue, TopicName,
};
use ingestion::{CallbackRegistration, QueueCallback, QueueMetricsSnapshot, QueueSettings, TopicQueue};
use parking_lot::Mutex;
use signal_catalog::SignalCatalog;
use tracing::{debug, error, info, instrument, trace};

use crate::directory::UrlDirectory;
use crate::error::{ExtractorError, Result};
use crate::value;

/// One registered callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackInfo {
    pub id: u64,
    pub url: String,
    pub topic: TopicName,
}

struct Registration {
    url: String,
    callback: QueueCallback,
}

/// Layout resolved for a (topic, url) pair against one schema
struct CachedLayout {
    schema: Bytes,
    layout: FieldLayout,
}

#[derive(Default)]
struct RouterState {
    queues: HashMap<TopicName, Arc<TopicQueue>>,
    /// Queues created before their topic could be described
    placeholders: HashSet<TopicName>,
    /// Per topic, id order is registration order
    callbacks: HashMap<TopicName, BTreeMap<u64, Registration>>,
    callback_topics: HashMap<u64, TopicName>,
    sync_configs: HashMap<String, SyncConfig>,
    blocking_overrides: HashMap<TopicName, bool>,
    targets: HashMap<TopicName, StructTarget>,
    /// Sample returned by the last synchronised read per topic
    last_delivered: HashMap<TopicName, ExtractedSample>,
    defaults: QueueSettings,
}

impl RouterState {
    fn registrations(&self, topic: &str) -> Vec<CallbackRegistration> {
        self.callbacks
            .get(topic)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|(id, registration)| {
                        CallbackRegistration::new(
                            *id,
                            registration.url.clone(),
                            Arc::clone(&registration.callback),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rebuild the queue's callback list from the bookkeeping
    fn refresh_callbacks(&self, topic: &str) {
        if let Some(queue) = self.queues.get(topic) {
            queue.set_callbacks(self.registrations(topic));
        }
    }

    fn settings_for(&self, topic: &str) -> QueueSettings {
        let mut settings = self.defaults.clone();
        if let Some(blocking) = self.blocking_overrides.get(topic) {
            settings.blocking = *blocking;
        }
        settings
    }

    fn all_queues(&self) -> Vec<Arc<TopicQueue>> {
        self.queues.values().cloned().collect()
    }
}

fn package_info(description: &SignalDescription) -> PackageInfo {
    let info = &description.basic_info;
    PackageInfo {
        device_name: info.device_name.clone(),
        source_id: info.source_id,
        instance_id: info.instance_id,
        cycle_id: info.cycle_id,
        format_type: info.format_type,
        requires_post_processing: false,
    }
}

/// Url-facing entry point for ingestion and reads
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use contracts::{ExtractionConfig, RawSample, ScalarType};
/// use extractor::{ExtractionRouter, StaticLayoutResolver};
/// use signal_catalog::{CatalogConfig, MockBus, SignalCatalog};
///
/// let catalog = Arc::new(SignalCatalog::start(Arc::new(MockBus::new()), CatalogConfig::default()).unwrap());
/// let router = ExtractionRouter::with_catalog(
///     catalog,
///     Arc::new(StaticLayoutResolver::new()),
///     &ExtractionConfig::default(),
/// );
///
/// router.connect("radar.front.objects.count", |url| println!("{url} updated"));
/// router.ingest("sig_radar", RawSample::copy_from("sig_radar", &[1, 0], 10));
/// let count = router.get_value("radar.front.objects.count", ScalarType::U16);
/// ```
pub struct ExtractionRouter {
    directory: Arc<dyn UrlDirectory>,
    resolver: Arc<dyn LayoutResolver>,
    state: Mutex<RouterState>,
    layouts: Mutex<HashMap<(TopicName, String), CachedLayout>>,
    next_id: AtomicU64,
}

impl fmt::Debug for ExtractionRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExtractionRouter")
            .field("queues", &state.queues.len())
            .field("callbacks", &state.callback_topics.len())
            .field("defaults", &state.defaults)
            .finish()
    }
}

impl ExtractionRouter {
    pub fn new(
        directory: Arc<dyn UrlDirectory>,
        resolver: Arc<dyn LayoutResolver>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            directory,
            resolver,
            state: Mutex::new(RouterState {
                defaults: QueueSettings::from(config),
                ..Default::default()
            }),
            layouts: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Router resolving urls through a running catalog
    pub fn with_catalog(
        catalog: Arc<SignalCatalog>,
        resolver: Arc<dyn LayoutResolver>,
        config: &ExtractionConfig,
    ) -> Self {
        Self::new(catalog, resolver, config)
    }

    /// Topic carrying `url`, or `url` itself when it cannot be resolved
    pub fn resolve_topic(&self, url: &str) -> TopicName {
        self.directory
            .resolve_topic(url)
            .unwrap_or_else(|| TopicName::from(url))
    }

    fn queue(&self, topic: &str) -> Option<Arc<TopicQueue>> {
        self.state.lock().queues.get(topic).cloned()
    }

    fn describe_topic(&self, topic: &str) -> Option<(String, SignalDescription)> {
        let root_url = self.directory.root_url(topic)?;
        let description = self.directory.describe(&root_url)?;
        Some((root_url, description))
    }

    fn declared_size(
        &self,
        topic: &str,
        root_url: &str,
        description: &SignalDescription,
    ) -> Option<usize> {
        self.resolver
            .resolve_layout(
                topic,
                root_url,
                &description.binary_schema,
                description.basic_info.format_type,
            )
            .map(|layout| layout.byte_size)
            .filter(|size| *size > 0)
    }

    /// Existing queue for `topic`, or a newly created one
    ///
    /// The flag is `true` while the queue is a placeholder without schema.
    fn queue_or_create(&self, topic: &TopicName) -> Result<(Arc<TopicQueue>, bool)> {
        {
            let state = self.state.lock();
            if let Some(queue) = state.queues.get(topic) {
                return Ok((Arc::clone(queue), state.placeholders.contains(topic)));
            }
        }
        self.create_queue(topic)
    }

    #[instrument(name = "router_create_queue", skip(self), fields(topic = %topic))]
    fn create_queue(&self, topic: &TopicName) -> Result<(Arc<TopicQueue>, bool)> {
        let described = self.describe_topic(topic);
        let (package, schema, declared_size) = match &described {
            Some((root_url, description)) => (
                package_info(description),
                description.binary_schema.clone(),
                self.declared_size(topic, root_url, description),
            ),
            None => (PackageInfo::default(), Bytes::new(), None),
        };

        let mut state = self.state.lock();
        if let Some(queue) = state.queues.get(topic) {
            return Ok((Arc::clone(queue), state.placeholders.contains(topic)));
        }

        let queue = TopicQueue::new(
            topic.clone(),
            Arc::clone(&self.resolver),
            package,
            schema,
            state.settings_for(topic),
        )?;
        queue.set_declared_size(declared_size);
        if let Some(target) = state.targets.get(topic) {
            queue.set_extraction_target(target.clone());
        }
        queue.set_callbacks(state.registrations(topic));

        let placeholder = described.is_none();
        if placeholder {
            state.placeholders.insert(topic.clone());
        }
        let queue = Arc::new(queue);
        state.queues.insert(topic.clone(), Arc::clone(&queue));

        info!(topic = %topic, placeholder, declared_size, "topic queue created");
        Ok((queue, placeholder))
    }

    /// Fill in package and schema once the topic can be described
    fn upgrade_placeholder(&self, topic: &TopicName, queue: &TopicQueue, format_type: FormatType) {
        let Some((root_url, description)) = self.describe_topic(topic) else {
            let mut package = queue.package();
            if format_type != FormatType::Unknown && package.format_type == FormatType::Unknown {
                package.format_type = format_type;
                queue.set_package(package);
            }
            return;
        };

        queue.set_package(package_info(&description));
        queue.set_declared_size(self.declared_size(topic, &root_url, &description));
        queue.set_schema(description.binary_schema);
        self.state.lock().placeholders.remove(topic);
        debug!(topic = %topic, root_url = %root_url, "placeholder queue described");
    }

    /// Hand a raw sample to the topic's queue, creating it on first sight
    ///
    /// Returns `false` when the sample was not accepted.
    pub fn ingest(&self, topic: &str, raw: RawSample) -> bool {
        let topic = TopicName::from(topic);
        let (queue, placeholder) = match self.queue_or_create(&topic) {
            Ok(found) => found,
            Err(e) => {
                error!(topic = %topic, error = %e, "failed to create topic queue");
                return false;
            }
        };
        if placeholder {
            self.upgrade_placeholder(&topic, &queue, raw.format_type);
        }
        queue.push(raw)
    }

    /// Register `callback` for updates of the topic carrying `url`
    ///
    /// Falls back to `url` as a literal topic name when it cannot be resolved.
    pub fn connect<F>(&self, url: &str, callback: F) -> u64
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let topic = self.resolve_topic(url);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.callbacks.entry(topic.clone()).or_default().insert(
            id,
            Registration {
                url: url.to_string(),
                callback: Arc::new(callback),
            },
        );
        state.callback_topics.insert(id, topic.clone());
        state.refresh_callbacks(&topic);

        debug!(id, url, topic = %topic, "callback connected");
        id
    }

    /// Remove a registration; a callback already running finishes
    pub fn disconnect(&self, id: u64) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(topic) = state.callback_topics.remove(&id) else {
            return false;
        };

        let now_empty = state.callbacks.get_mut(&topic).is_some_and(|registrations| {
            registrations.remove(&id);
            registrations.is_empty()
        });
        if now_empty {
            state.callbacks.remove(&topic);
        }
        state.refresh_callbacks(&topic);

        debug!(id, topic = %topic, "callback disconnected");
        true
    }

    pub fn callbacks_info(&self) -> Vec<CallbackInfo> {
        let state = self.state.lock();
        let mut info: Vec<CallbackInfo> = state
            .callbacks
            .iter()
            .flat_map(|(topic, registrations)| {
                registrations.iter().map(move |(id, registration)| CallbackInfo {
                    id: *id,
                    url: registration.url.clone(),
                    topic: topic.clone(),
                })
            })
            .collect();
        info.sort_by_key(|entry| entry.id);
        info
    }

    /// Newest converted sample of the topic carrying `url`
    pub fn get_latest(&self, url: &str) -> Option<ExtractedSample> {
        let topic = self.resolve_topic(url);
        self.queue(&topic)?.latest()
    }

    /// Layout of `url`, cached per (topic, url)
    ///
    /// A cached layout is resolved again once the topic's schema changes.
    pub fn layout(&self, url: &str) -> Option<FieldLayout> {
        let topic = self.resolve_topic(url);
        let (schema, format_type) = self
            .directory
            .describe(url)
            .map(|description| (description.binary_schema, description.basic_info.format_type))
            .unwrap_or_default();

        let key = (topic, url.to_string());
        if let Some(cached) = self.layouts.lock().get(&key) {
            if cached.schema == schema {
                return Some(cached.layout);
            }
        }

        let layout = self
            .resolver
            .resolve_layout(&key.0, url, &schema, format_type)?;
        debug!(url, topic = %key.0, ?layout, "field layout resolved");
        self.layouts.lock().insert(key, CachedLayout { schema, layout });
        Some(layout)
    }

    /// Sample plain reads decode from: the last synchronised one, else the newest
    fn current_sample(&self, topic: &TopicName) -> Option<ExtractedSample> {
        if let Some(sample) = self.state.lock().last_delivered.get(topic) {
            return Some(sample.clone());
        }
        self.queue(topic)?.latest()
    }

    /// Value of `url` as `scalar`
    ///
    /// `None` for unknown urls, missing data, or a type whose size does not
    /// match the field.
    pub fn get_value(&self, url: &str, scalar: ScalarType) -> Option<SignalValue> {
        let layout = self.layout(url)?;
        let sample = self.current_sample(&self.resolve_topic(url))?;
        let value = value::decode_scalar(&sample.payload, &layout, scalar);
        if value.is_none() {
            debug!(url, ?scalar, ?layout, "value does not fit field layout");
        }
        value
    }

    /// Every element of an array field
    pub fn get_vector_value(&self, url: &str, scalar: ScalarType) -> Option<Vec<SignalValue>> {
        let layout = self.layout(url)?;
        let sample = self.current_sample(&self.resolve_topic(url))?;
        value::decode_vector(&sample.payload, &layout, scalar)
    }

    /// Field layout together with its elements decoded as the layout's own type
    pub fn get_value_and_layout(&self, url: &str) -> Option<(FieldLayout, Vec<SignalValue>)> {
        let layout = self.layout(url)?;
        let sample = self.current_sample(&self.resolve_topic(url))?;
        let values = value::decode_vector(&sample.payload, &layout, layout.scalar_type)?;
        Some((layout, values))
    }

    pub fn set_sync_config(&self, url: &str, config: SyncConfig) {
        debug!(url, strategy = config.strategy.as_str(), "sync config set");
        self.state
            .lock()
            .sync_configs
            .insert(url.to_string(), config);
    }

    pub fn sync_config(&self, url: &str) -> Result<SyncConfig> {
        self.state
            .lock()
            .sync_configs
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractorError::NoSyncConfig {
                url: url.to_string(),
            })
    }

    /// Select one sample of the url's topic with its sync strategy
    ///
    /// The first sync value is the comparison target. On success the obsolete
    /// entries are removed from the history and the sample becomes the one
    /// plain reads of this topic decode from.
    #[instrument(level = "trace", name = "router_get_synchronized", skip(self, sync_values))]
    pub fn get_synchronized(&self, url: &str, sync_values: &[SyncValue]) -> Option<ExtractedSample> {
        let config = match self.sync_config(url) {
            Ok(config) => config,
            Err(e) => {
                debug!(url, error = %e, "synchronised read without config");
                return None;
            }
        };
        let target = sync_values.first().map(SyncValue::target).unwrap_or(0);

        let topic = self.resolve_topic(url);
        let queue = self.queue(&topic)?;

        let layout = match config.strategy {
            SyncStrategyKind::ExactValue | SyncStrategyKind::NearestValue => {
                self.layout(&config.composition_url)?
            }
            SyncStrategyKind::Latest | SyncStrategyKind::ExactHeaderTimestamp => {
                FieldLayout::scalar(0, ScalarType::U64)
            }
        };

        let sample = queue.select_and_drain(|history| {
            let selection = sync_engine::select(config.strategy, history, &layout, target);
            let obsolete = selection.obsolete;
            (selection.sample, obsolete)
        })?;
        trace!(url, topic = %topic, sync_target = target, "synchronised sample selected");

        self.state
            .lock()
            .last_delivered
            .insert(topic, sample.clone());
        Some(sample)
    }

    /// Blocking mode for every current queue and future queues
    ///
    /// Clears per-url overrides.
    pub fn set_blocking(&self, blocking: bool) {
        let queues = {
            let mut state = self.state.lock();
            state.defaults.blocking = blocking;
            state.blocking_overrides.clear();
            state.all_queues()
        };
        for queue in queues {
            queue.set_blocking(blocking);
        }
    }

    /// Blocking mode for the topic carrying `url`, kept for a queue created later
    pub fn set_blocking_for_url(&self, url: &str, blocking: bool) {
        let topic = self.resolve_topic(url);
        let queue = {
            let mut state = self.state.lock();
            state.blocking_overrides.insert(topic.clone(), blocking);
            state.queues.get(&topic).cloned()
        };
        if let Some(queue) = queue {
            queue.set_blocking(blocking);
        }
    }

    pub fn set_drop_extra_input(&self, drop_extra_input: bool) {
        let queues = {
            let mut state = self.state.lock();
            state.defaults.drop_extra_input = drop_extra_input;
            state.all_queues()
        };
        for queue in queues {
            queue.set_drop_extra_input(drop_extra_input);
        }
    }

    pub fn set_size_diff_threshold(&self, threshold: usize) {
        let queues = {
            let mut state = self.state.lock();
            state.defaults.size_diff_threshold = threshold;
            state.all_queues()
        };
        for queue in queues {
            queue.set_size_diff_threshold(threshold);
        }
    }

    pub fn set_max_history(&self, max_history: usize) {
        let max_history = max_history.max(1);
        let queues = {
            let mut state = self.state.lock();
            state.defaults.max_history = max_history;
            state.all_queues()
        };
        for queue in queues {
            queue.set_max_history(max_history);
        }
    }

    pub fn is_data_available(&self, topic: &str) -> bool {
        self.queue(topic)
            .is_some_and(|queue| queue.is_data_available())
    }

    /// Most recent unconverted input of `topic`
    pub fn raw_data(&self, topic: &str) -> Option<RawSample> {
        self.queue(topic)?.raw_snapshot()
    }

    pub fn history(&self, topic: &str) -> Vec<ExtractedSample> {
        self.queue(topic)
            .map(|queue| queue.pull_history())
            .unwrap_or_default()
    }

    pub fn remove_oldest(&self, topic: &str, count: usize) -> usize {
        self.queue(topic)
            .map(|queue| queue.remove_oldest(count))
            .unwrap_or(0)
    }

    /// Drop the entries handed out by the last history read of `topic`
    pub fn clear_history(&self, topic: &str) -> usize {
        let queue = {
            let mut state = self.state.lock();
            state.last_delivered.remove(topic);
            state.queues.get(topic).cloned()
        };
        queue.map(|queue| queue.clear()).unwrap_or(0)
    }

    /// Declare the output struct a port's topic is adapted to
    ///
    /// # Errors
    /// `InvalidVersion` when `version` is not `major.minor.patch[.bugfix]`.
    pub fn set_extraction_version(
        &self,
        port: &str,
        size: usize,
        version: &str,
        converter: &str,
    ) -> Result<()> {
        let encoded = config_loader::parse_struct_version(version)?;
        let topic = self.resolve_topic(port);
        let target = StructTarget {
            url: port.to_string(),
            size,
            version: encoded,
            converter: converter.to_string(),
        };

        let queue = {
            let mut state = self.state.lock();
            state.targets.insert(topic.clone(), target.clone());
            state.queues.get(&topic).cloned()
        };
        if let Some(queue) = queue {
            queue.set_extraction_target(target);
        }

        info!(port, topic = %topic, size, version, converter, "extraction version set");
        Ok(())
    }

    /// Push a zero-filled payload and return the newest history entry
    pub fn insert_empty_sample(&self, topic: &str, size: usize) -> Option<ExtractedSample> {
        let raw = RawSample {
            topic: TopicName::from(topic),
            payload: vec![0; size],
            timestamp: 0,
            format_type: FormatType::Unknown,
            requires_post_processing: false,
        };
        if !self.ingest(topic, raw) {
            return None;
        }
        self.queue(topic)?.latest()
    }

    pub fn queue_count(&self) -> usize {
        self.state.lock().queues.len()
    }

    pub fn queue_metrics(&self, topic: &str) -> Result<QueueMetricsSnapshot> {
        self.queue(topic)
            .map(|queue| queue.metrics())
            .ok_or_else(|| ExtractorError::NotFound {
                topic: topic.to_string(),
            })
    }

    /// Clear every callback, then drop the queues
    pub fn shutdown(&self) {
        let queues: Vec<Arc<TopicQueue>> = {
            let mut state = self.state.lock();
            state.callbacks.clear();
            state.callback_topics.clear();
            state.placeholders.clear();
            state.queues.drain().map(|(_, queue)| queue).collect()
        };
        if queues.is_empty() {
            return;
        }

        for queue in &queues {
            queue.set_callbacks(Vec::new());
        }
        info!(queues = queues.len(), "extraction router shut down");
    }
}

impl Drop for ExtractionRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
