//! TopicQueue - buffered conversion pipeline for one topic

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use bytes::Bytes;
use contracts::{
    CancellationToken, ExtractedSample, FormatType, LayoutResolver, PackageInfo, RawSample,
    StructTarget, TopicName,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, error, instrument, trace, warn};

use crate::config::{QueueMetrics, QueueMetricsSnapshot, QueueSettings};
use crate::convert::convert_sample;
use crate::error::{QueueError, Result};

/// Consumer callback, invoked with the url it was registered for
pub type QueueCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// One consumer registration on a queue
#[derive(Clone)]
pub struct CallbackRegistration {
    pub id: u64,
    pub url: String,
    pub callback: QueueCallback,
}

impl CallbackRegistration {
    pub fn new(id: u64, url: impl Into<String>, callback: QueueCallback) -> Self {
        Self {
            id,
            url: url.into(),
            callback,
        }
    }
}

impl fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistration")
            .field("id", &self.id)
            .field("url", &self.url)
            .finish()
    }
}

struct QueueState {
    history: HeapRb<ExtractedSample>,
    staging: Vec<RawSample>,
    settings: QueueSettings,
    callbacks: Vec<CallbackRegistration>,
    last_raw: Option<RawSample>,
    /// Pushes or worker batches currently converting
    in_flight: usize,
    /// Threads currently inside callback delivery
    delivering: Vec<ThreadId>,
    /// History length handed out by the most recent pull
    provided: usize,
    package: PackageInfo,
    schema: Bytes,
    declared_size: Option<usize>,
    target: Option<StructTarget>,
}

impl QueueState {
    fn target_size(&self) -> Option<usize> {
        self.target
            .as_ref()
            .map(|target| target.size)
            .or(self.declared_size)
    }

    fn pop_front(&mut self, count: usize) -> usize {
        let mut removed = 0;
        while removed < count && self.history.try_pop().is_some() {
            removed += 1;
        }
        self.provided = self.provided.saturating_sub(removed);
        removed
    }
}

struct QueueShared {
    topic: TopicName,
    state: Mutex<QueueState>,
    /// Signalled when staging receives samples or on teardown
    staged: Condvar,
    /// Signalled when no conversion is in flight
    idle: Condvar,
    /// Serialises blocking pushes
    push_lock: Mutex<()>,
    resolver: Arc<dyn LayoutResolver>,
    token: CancellationToken,
    metrics: QueueMetrics,
}

/// Decrements the in-flight count when a conversion round ends
struct InFlightGuard<'a> {
    shared: &'a QueueShared,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.shared.idle.notify_all();
        }
    }
}

/// Marks the current thread as delivering callbacks
struct DeliveryGuard<'a> {
    shared: &'a QueueShared,
    thread: ThreadId,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if let Some(pos) = state.delivering.iter().position(|id| *id == self.thread) {
            state.delivering.swap_remove(pos);
        }
    }
}

impl QueueShared {
    /// Convert, append to history and deliver to callbacks
    fn process(&self, raw: RawSample) {
        let (package, schema, target_size, threshold) = {
            let state = self.state.lock();
            let mut package = state.package.clone();
            if raw.format_type != FormatType::Unknown {
                package.format_type = raw.format_type;
            }
            package.requires_post_processing |= raw.requires_post_processing;
            (
                package,
                state.schema.clone(),
                state.target_size(),
                state.settings.size_diff_threshold,
            )
        };

        let payload = match convert_sample(
            self.resolver.as_ref(),
            &raw,
            &schema,
            &package,
            target_size,
            threshold,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "conversion failed, sample dropped");
                self.metrics.record_conversion_failure();
                observability::record_conversion_failure(&self.topic);
                return;
            }
        };

        let sample = ExtractedSample::new(payload, raw.timestamp);
        let (callbacks, depth) = {
            let mut state = self.state.lock();
            if state.history.is_full() {
                state.pop_front(1);
                self.metrics.record_evicted();
            }
            // Cannot fail, room was made above
            let _ = state.history.try_push(sample);
            (state.callbacks.clone(), state.history.occupied_len())
        };

        self.metrics.record_converted();
        self.metrics.update_history_depth(depth);
        observability::record_sample_converted(&self.topic);
        observability::record_history_depth(&self.topic, depth);

        self.deliver(&callbacks);
    }

    /// Wait until staging is drained and nothing is converting
    ///
    /// Returns at once on the thread currently delivering callbacks of this
    /// queue, and on teardown.
    fn wait_idle(&self, state: &mut MutexGuard<'_, QueueState>) {
        let me = thread::current().id();
        while (state.in_flight > 0 || !state.staging.is_empty())
            && !state.delivering.contains(&me)
            && !self.token.is_cancelled()
        {
            self.idle.wait(state);
        }
    }

    fn deliver(&self, callbacks: &[CallbackRegistration]) {
        if callbacks.is_empty() {
            return;
        }

        let thread = thread::current().id();
        self.state.lock().delivering.push(thread);
        let _guard = DeliveryGuard {
            shared: self,
            thread,
        };

        for registration in callbacks {
            trace!(topic = %self.topic, url = %registration.url, id = registration.id, "deliver");
            (registration.callback)(&registration.url);
        }
    }

    fn run_worker(&self) {
        debug!(topic = %self.topic, "queue worker started");

        loop {
            let batch = {
                let mut state = self.state.lock();
                while state.staging.is_empty() && !self.token.is_cancelled() {
                    self.staged.wait(&mut state);
                }
                if state.staging.is_empty() {
                    break;
                }

                let mut batch = std::mem::take(&mut state.staging);
                if state.settings.drop_extra_input && batch.len() > 1 {
                    let dropped = batch.len() - 1;
                    batch.drain(..dropped);
                    self.metrics.record_dropped(dropped);
                    observability::record_samples_dropped(&self.topic, dropped);
                }
                state.in_flight += 1;
                batch
            };

            let _in_flight = InFlightGuard { shared: self };
            for raw in batch {
                self.process(raw);
            }
        }

        debug!(topic = %self.topic, "queue worker stopped");
    }
}

/// Buffered conversion pipeline for exactly one topic
///
/// Owns a bounded history of converted samples, a staging list for raw input
/// and the callbacks registered for the topic. In blocking mode `push`
/// converts and delivers on the caller's thread; otherwise a dedicated worker
/// does it in push order.
///
/// # Example
///
/// ```ignore
/// let queue = TopicQueue::new("sig:can".into(), resolver, package, schema, settings)?;
/// queue.push(RawSample::copy_from("sig:can", &payload, ts));
/// let history = queue.pull_history();
/// ```
pub struct TopicQueue {
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for TopicQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TopicQueue")
            .field("topic", &self.shared.topic)
            .field("len", &state.history.occupied_len())
            .field("staged", &state.staging.len())
            .field("settings", &state.settings)
            .finish()
    }
}

impl TopicQueue {
    /// Create a queue and start its worker
    #[instrument(
        name = "topic_queue_new",
        skip(resolver, package, schema, settings),
        fields(topic = %topic)
    )]
    pub fn new(
        topic: TopicName,
        resolver: Arc<dyn LayoutResolver>,
        package: PackageInfo,
        schema: Bytes,
        settings: QueueSettings,
    ) -> Result<Self> {
        let capacity = settings.max_history.max(1);
        let shared = Arc::new(QueueShared {
            topic: topic.clone(),
            state: Mutex::new(QueueState {
                history: HeapRb::new(capacity),
                staging: Vec::new(),
                settings,
                callbacks: Vec::new(),
                last_raw: None,
                in_flight: 0,
                delivering: Vec::new(),
                provided: 0,
                package,
                schema,
                declared_size: None,
                target: None,
            }),
            staged: Condvar::new(),
            idle: Condvar::new(),
            push_lock: Mutex::new(()),
            resolver,
            token: CancellationToken::new(),
            metrics: QueueMetrics::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("sigflow-queue-{topic}"))
            .spawn(move || worker_shared.run_worker())
            .map_err(|source| QueueError::Spawn {
                topic: topic.to_string(),
                source,
            })?;

        debug!(topic = %topic, capacity, "topic queue created");

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn topic(&self) -> &TopicName {
        &self.shared.topic
    }

    /// Ingest one raw sample
    ///
    /// Returns `false` once the queue is terminating.
    pub fn push(&self, raw: RawSample) -> bool {
        let shared = &self.shared;
        if shared.token.is_cancelled() {
            return false;
        }
        shared.metrics.record_received();
        observability::record_sample_received(&shared.topic);

        let blocking = {
            let mut state = shared.state.lock();
            let blocking = state.settings.blocking;
            if blocking {
                // Staged samples go first; waited for outside the push lock
                // since worker callbacks may push too
                shared.wait_idle(&mut state);
            }
            blocking
        };
        if blocking {
            let _serial = shared.push_lock.lock();
            {
                let mut state = shared.state.lock();
                state.last_raw = Some(raw.clone());
                state.in_flight += 1;
            }
            let _in_flight = InFlightGuard { shared };
            shared.process(raw);
        } else {
            let mut state = shared.state.lock();
            state.last_raw = Some(raw.clone());
            state.staging.push(raw);
            shared.staged.notify_one();
        }
        true
    }

    /// Snapshot of the history, oldest first
    ///
    /// Waits until no push or conversion is in flight, unless called from a
    /// callback this queue is currently delivering.
    pub fn pull_history(&self) -> Vec<ExtractedSample> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        shared.wait_idle(&mut state);

        let snapshot: Vec<ExtractedSample> = state.history.iter().cloned().collect();
        state.provided = snapshot.len();
        snapshot
    }

    /// Run `select` over the history and drop the entries it reports obsolete
    ///
    /// `select` returns its result and the number of leading entries to
    /// remove. Both happen under the queue lock, so no sample can be appended
    /// (and no old one evicted) between the selection and the removal.
    pub fn select_and_drain<T, F>(&self, select: F) -> T
    where
        F: FnOnce(&[ExtractedSample]) -> (T, usize),
    {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        shared.wait_idle(&mut state);

        let snapshot: Vec<ExtractedSample> = state.history.iter().cloned().collect();
        state.provided = snapshot.len();
        let (selected, obsolete) = select(&snapshot);

        let removed = state.pop_front(obsolete);
        shared
            .metrics
            .update_history_depth(state.history.occupied_len());
        trace!(topic = %shared.topic, obsolete, removed, "selected and drained");
        selected
    }

    /// Newest history entry
    pub fn latest(&self) -> Option<ExtractedSample> {
        self.pull_history().pop()
    }

    pub fn is_data_available(&self) -> bool {
        !self.pull_history().is_empty()
    }

    /// Drop up to `count` entries from the front, returns how many were removed
    pub fn remove_oldest(&self, count: usize) -> usize {
        let mut state = self.shared.state.lock();
        let removed = state.pop_front(count);
        self.shared
            .metrics
            .update_history_depth(state.history.occupied_len());
        removed
    }

    /// Drop the entries handed out by the most recent pull
    ///
    /// Entries that arrived after that pull stay.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let provided = state.provided;
        let removed = state.pop_front(provided);
        state.provided = 0;
        self.shared
            .metrics
            .update_history_depth(state.history.occupied_len());
        removed
    }

    /// Most recent unconverted input
    pub fn raw_snapshot(&self) -> Option<RawSample> {
        self.shared.state.lock().last_raw.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().history.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn settings(&self) -> QueueSettings {
        self.shared.state.lock().settings.clone()
    }

    /// Change the history bound, keeping the newest entries
    pub fn set_max_history(&self, max_history: usize) {
        let capacity = max_history.max(1);
        let mut state = self.shared.state.lock();
        if state.settings.max_history == capacity {
            return;
        }

        let mut history = HeapRb::new(capacity);
        let len = state.history.occupied_len();
        for sample in state.history.iter().skip(len.saturating_sub(capacity)) {
            let _ = history.try_push(sample.clone());
        }
        state.history = history;
        state.settings.max_history = capacity;
        state.provided = state.provided.min(capacity);
        self.shared
            .metrics
            .update_history_depth(state.history.occupied_len());
    }

    pub fn set_blocking(&self, blocking: bool) {
        self.shared.state.lock().settings.blocking = blocking;
    }

    pub fn set_drop_extra_input(&self, drop_extra_input: bool) {
        self.shared.state.lock().settings.drop_extra_input = drop_extra_input;
    }

    pub fn set_size_diff_threshold(&self, threshold: usize) {
        self.shared.state.lock().settings.size_diff_threshold = threshold;
    }

    /// Replace the callback list, invoked in the given order
    pub fn set_callbacks(&self, callbacks: Vec<CallbackRegistration>) {
        self.shared.state.lock().callbacks = callbacks;
    }

    pub fn callback_count(&self) -> usize {
        self.shared.state.lock().callbacks.len()
    }

    /// Update package metadata once real data with a known format arrives
    pub fn set_package(&self, package: PackageInfo) {
        self.shared.state.lock().package = package;
    }

    pub fn package(&self) -> PackageInfo {
        self.shared.state.lock().package.clone()
    }

    pub fn set_schema(&self, schema: Bytes) {
        self.shared.state.lock().schema = schema;
    }

    /// Declared payload size of the topic, used for size adaptation
    pub fn set_declared_size(&self, size: Option<usize>) {
        self.shared.state.lock().declared_size = size;
    }

    /// Declared output struct; its size overrides the declared topic size
    pub fn set_extraction_target(&self, target: StructTarget) {
        debug!(
            topic = %self.shared.topic,
            url = %target.url,
            size = target.size,
            version = target.version,
            "extraction target set"
        );
        self.shared.state.lock().target = Some(target);
    }

    pub fn extraction_target(&self) -> Option<StructTarget> {
        self.shared.state.lock().target.clone()
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stop accepting samples, drain staged input and join the worker
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            // Last handle dropped from inside a callback; the worker exits on its own
            self.shared.token.cancel();
            return;
        }

        self.shared.token.cancel();
        {
            let _state = self.shared.state.lock();
            self.shared.staged.notify_all();
            self.shared.idle.notify_all();
        }

        if worker.join().is_err() {
            error!(topic = %self.shared.topic, "queue worker panicked");
        }
    }
}

impl Drop for TopicQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
