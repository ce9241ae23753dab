//! Background discovery worker
//!
//! Polls the bus, applies the stability filter, ages and evicts cache entries,
//! probes new topics and fires pending resolutions. Control messages arrive
//! over a crossbeam channel; callbacks are always invoked without the cache
//! lock held.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use contracts::{BasicInfo, ContractError, TopicMetadata};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::cache::TopicCacheEntry;
use crate::catalog::CatalogInner;

/// Message to the discovery worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Control {
    /// A producer announced a registration change
    TopicsChanged,
    /// The bus layer reported these topics gone
    InvalidateTopics(Vec<String>),
    Shutdown,
}

/// What one discovery cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub new_topics: usize,
    pub resolved: usize,
    pub evicted: usize,
    pub topics: usize,
    /// A namespaced topic had no descriptor yet
    pub unsettled: bool,
}

type Described = (String, TopicMetadata, Result<(BasicInfo, Option<Bytes>), ContractError>);

impl CatalogInner {
    pub(crate) fn run(&self, control: Receiver<Control>) {
        info!("discovery worker started");

        self.initial_fill();
        self.mark_ready();

        'outer: while !self.token.is_cancelled() {
            match control.recv_timeout(self.config.poll_interval()) {
                Ok(message) => {
                    if !self.handle_control(message) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.drain_control(&control) {
                break;
            }

            self.run_cycle(self.config.stability_samples);

            while self.in_settle_window() && !self.token.is_cancelled() {
                if self.token.sleep(self.config.settle_loop_sleep()) {
                    break 'outer;
                }
                if !self.drain_control(&control) {
                    break 'outer;
                }
                self.run_cycle(self.config.stability_samples);
            }
        }

        info!("discovery worker stopped");
    }

    fn initial_fill(&self) {
        let started = Instant::now();
        for round in 0..self.config.initial_fill_rounds {
            if self.token.is_cancelled() {
                return;
            }
            let report = self.run_cycle(self.config.initial_stability_samples);
            debug!(round, topics = report.topics, "initial fill round");
        }
        info!(
            topics = self.cache.lock().entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "initial fill complete"
        );
    }

    /// Returns `false` on shutdown
    fn handle_control(&self, message: Control) -> bool {
        match message {
            Control::TopicsChanged => {
                debug!("topics changed, opening settle window");
                self.open_settle_window();
                true
            }
            Control::InvalidateTopics(topics) => {
                self.invalidate(&topics);
                true
            }
            Control::Shutdown => false,
        }
    }

    fn drain_control(&self, control: &Receiver<Control>) -> bool {
        while let Ok(message) = control.try_recv() {
            if !self.handle_control(message) {
                return false;
            }
        }
        true
    }

    pub(crate) fn open_settle_window(&self) {
        *self.settle_until.lock() = Some(Instant::now() + self.config.settle_window());
    }

    fn in_settle_window(&self) -> bool {
        self.settle_until
            .lock()
            .is_some_and(|until| Instant::now() < until)
    }

    /// List topics until the count holds still for `required` samples
    ///
    /// Bounded by `max_sample_attempts`, after which the accumulated listing is
    /// used as is. `None` when cancelled.
    fn stable_listing(&self, required: u32) -> Option<HashMap<String, TopicMetadata>> {
        let required = required.max(1);
        let mut accumulated = HashMap::new();
        let mut last_count = 0usize;
        let mut streak = 0u32;

        for attempt in 0..self.config.max_sample_attempts.max(1) {
            if attempt > 0 && self.token.sleep(self.config.sample_interval()) {
                return None;
            }

            match self.bus.list_topics() {
                Ok(topics) => {
                    let count = topics.len();
                    accumulated.extend(topics);
                    if count == last_count {
                        streak += 1;
                    } else {
                        last_count = count;
                        streak = 0;
                    }
                    if streak >= required {
                        return Some(accumulated);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "topic listing failed");
                    streak = 0;
                }
            }
        }

        debug!(
            attempts = self.config.max_sample_attempts,
            "topic listing did not settle, using accumulated listing"
        );
        Some(accumulated)
    }

    #[instrument(level = "debug", name = "catalog_discovery_cycle", skip(self))]
    pub(crate) fn run_cycle(&self, required: u32) -> CycleReport {
        let started = Instant::now();
        let Some(listing) = self.stable_listing(required) else {
            return CycleReport::default();
        };

        let mut report = CycleReport::default();
        let to_describe = self.age_entries(&listing, &mut report);

        let described = self.describe_topics(to_describe);

        let fired = {
            let mut cache = self.cache.lock();
            for (topic, metadata, result) in described {
                match result {
                    Ok((info, schema)) => match cache.insert_root(&topic, metadata, info, schema) {
                        Some(root_url) => {
                            debug!(topic = %topic, root_url = %root_url, "topic resolved");
                            report.resolved += 1;
                        }
                        None => debug!(topic = %topic, "topic has no usable root url yet"),
                    },
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "schema unavailable, retrying next cycle");
                        self.metrics.record_schema_failure();
                    }
                }
            }
            report.topics = cache.entries.len();

            if report.resolved > 0 {
                cache.drain_resolvable()
            } else {
                Vec::new()
            }
        };

        if report.unsettled {
            self.open_settle_window();
        }

        for resolution in fired {
            self.fire(
                resolution.id,
                resolution.url,
                &resolution.root_url,
                resolution.callback,
            );
        }

        if report.evicted > 0 {
            info!(count = report.evicted, "stale topics evicted");
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_cycle(report.topics);
        self.metrics.record_evictions(report.evicted);
        observability::record_discovery_cycle(elapsed_ms, report.topics);
        observability::record_stale_evictions(report.evicted);

        report
    }

    /// Tick every entry, refresh observed ones and evict stale ones
    ///
    /// Returns the topics whose descriptor still has to be probed.
    fn age_entries(
        &self,
        listing: &HashMap<String, TopicMetadata>,
        report: &mut CycleReport,
    ) -> Vec<(String, TopicMetadata)> {
        let prefix = self.config.namespace_prefix.as_str();
        let max_ticks = self.max_ticks();
        let mut to_describe = Vec::new();

        let mut cache = self.cache.lock();
        for entry in cache.entries.values_mut() {
            entry.tick_count = entry.tick_count.saturating_add(1);
        }

        for (topic, metadata) in listing {
            if !metadata.type_name.starts_with(prefix) {
                continue;
            }

            let same_type = cache
                .entries
                .get(topic)
                .map(|entry| entry.type_name == metadata.type_name);

            if metadata.descriptor.is_empty() {
                // Subscriber seen before its publisher
                if let (Some(true), Some(entry)) = (same_type, cache.entries.get_mut(topic)) {
                    entry.tick_count = 0;
                }
                report.unsettled = true;
                continue;
            }

            match same_type {
                Some(true) => {
                    if let Some(entry) = cache.entries.get_mut(topic) {
                        entry.tick_count = 0;
                        if entry.resolved_url.is_none() {
                            to_describe.push((topic.clone(), metadata.clone()));
                        }
                    }
                }
                Some(false) => {
                    info!(topic = %topic, type_name = %metadata.type_name, "topic type changed");
                    cache.evict_topic(topic);
                    cache
                        .entries
                        .insert(topic.clone(), TopicCacheEntry::new(&metadata.type_name));
                    to_describe.push((topic.clone(), metadata.clone()));
                    report.new_topics += 1;
                }
                None => {
                    cache
                        .entries
                        .insert(topic.clone(), TopicCacheEntry::new(&metadata.type_name));
                    to_describe.push((topic.clone(), metadata.clone()));
                    report.new_topics += 1;
                }
            }
        }

        report.evicted = cache.evict_stale(max_ticks).len();
        to_describe
    }

    fn describe_topics(&self, pending: Vec<(String, TopicMetadata)>) -> Vec<Described> {
        let eager = self.config.eager_schema_fetch;
        let describe = |(topic, metadata): (String, TopicMetadata)| -> Described {
            let result = self.bus.probe(&topic, &metadata).and_then(|info| {
                if eager {
                    let schema = self.bus.fetch_schema(&topic, &metadata)?;
                    Ok((info, Some(schema)))
                } else {
                    Ok((info, None))
                }
            });
            (topic, metadata, result)
        };

        if self.config.parallel_fetch && pending.len() > 1 {
            pending.into_par_iter().map(describe).collect()
        } else {
            pending.into_iter().map(describe).collect()
        }
    }

    pub(crate) fn invalidate(&self, topics: &[String]) -> usize {
        let mut cache = self.cache.lock();
        let evicted = topics
            .iter()
            .filter(|topic| cache.evict_topic(topic))
            .count();
        drop(cache);

        if evicted > 0 {
            info!(count = evicted, "topics invalidated");
            self.metrics.record_evictions(evicted);
        }
        evicted
    }
}
