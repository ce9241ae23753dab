//! # Integration Tests
//!
//! Cross-crate end-to-end tests.
//!
//! Covers:
//! - Catalog discovery feeding the extraction router
//! - Synchronised reads over a discovered topic
//! - Callback fan-out and configuration wiring

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_defaults() {
        let config = contracts::SigflowConfig::default();
        assert_eq!(config.catalog.namespace_prefix, "sig:");
        assert_eq!(
            contracts::SyncStrategyKind::default(),
            contracts::SyncStrategyKind::Latest
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        BasicInfo, CatalogConfig, ExtractionConfig, FieldLayout, FormatType, RawSample,
        ScalarType, SignalValue, SyncConfig, SyncStrategyKind, SyncValue,
    };
    use extractor::{ExtractionRouter, StaticLayoutResolver};
    use observability::SelectionAggregator;
    use parking_lot::Mutex;
    use signal_catalog::{MockBus, SignalCatalog};

    const TOPIC: &str = "sig_radar_front";
    const ROOT: &str = "radar.front.objects";
    const SEQ_URL: &str = "radar.front.objects.sequence";
    const SPEED_URL: &str = "radar.front.objects.speed";

    fn catalog_config() -> CatalogConfig {
        CatalogConfig {
            poll_interval_ms: 10,
            settle_window_ms: 50,
            settle_loop_sleep_ms: 5,
            stability_samples: 1,
            initial_stability_samples: 1,
            initial_fill_rounds: 2,
            sample_interval_ms: 1,
            max_sample_attempts: 20,
            max_accepted_ticks: 5,
            ..Default::default()
        }
    }

    fn radar_info() -> BasicInfo {
        BasicInfo {
            device_name: "radar".into(),
            view_name: "front".into(),
            group_name: "objects".into(),
            format_type: FormatType::Can,
            ..Default::default()
        }
    }

    fn resolver() -> Arc<StaticLayoutResolver> {
        Arc::new(
            StaticLayoutResolver::new()
                .with_field(ROOT, FieldLayout::array(0, ScalarType::U8, 12))
                .with_field(SEQ_URL, FieldLayout::scalar(0, ScalarType::U64))
                .with_field(SPEED_URL, FieldLayout::scalar(8, ScalarType::F32)),
        )
    }

    fn payload(sequence: u64, speed: f32) -> Vec<u8> {
        let mut bytes = sequence.to_le_bytes().to_vec();
        bytes.extend_from_slice(&speed.to_le_bytes());
        bytes
    }

    fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    /// Catalog over a mock bus with the radar topic already published
    fn discovered() -> (Arc<MockBus>, Arc<SignalCatalog>) {
        let bus = Arc::new(MockBus::new());
        bus.publish(TOPIC, "sig:objects", radar_info(), b"schema".to_vec())
            .unwrap();
        let catalog = Arc::new(SignalCatalog::start(bus.clone(), catalog_config()).unwrap());
        (bus, catalog)
    }

    fn blocking_router(catalog: Arc<SignalCatalog>) -> ExtractionRouter {
        let config = ExtractionConfig {
            blocking: true,
            ..Default::default()
        };
        ExtractionRouter::with_catalog(catalog, resolver(), &config)
    }

    /// End-to-end: MockBus -> SignalCatalog -> ExtractionRouter -> ExactValue read
    #[test]
    fn test_e2e_exact_value_selection() {
        let (_bus, catalog) = discovered();
        assert!(catalog.check_available(SEQ_URL));

        let router = blocking_router(catalog);
        for (i, sequence) in [1u64, 3, 5, 7].into_iter().enumerate() {
            let raw = RawSample::copy_from(TOPIC, &payload(sequence, 1.5), 100 + i as u64);
            assert!(router.ingest(TOPIC, raw));
        }
        router.set_sync_config(SEQ_URL, SyncConfig::new(SyncStrategyKind::ExactValue, SEQ_URL));

        let sample = router
            .get_synchronized(SEQ_URL, &[SyncValue::from(5)])
            .unwrap();
        assert_eq!(sample.timestamp, 102);
        assert_eq!(router.history(TOPIC).len(), 2);
        assert_eq!(
            router.get_value(SEQ_URL, ScalarType::U64),
            Some(SignalValue::U64(5))
        );
        assert_eq!(
            router.get_value(SPEED_URL, ScalarType::F32),
            Some(SignalValue::F32(1.5))
        );
    }

    /// Two callbacks on the same url both fire once per push
    #[test]
    fn test_e2e_callback_fan_out() {
        let (_bus, catalog) = discovered();
        let router = blocking_router(catalog);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&first);
        let b = Arc::clone(&second);
        router.connect(SEQ_URL, move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        router.connect(SEQ_URL, move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..3u64 {
            router.ingest(TOPIC, RawSample::copy_from(TOPIC, &payload(i, 0.0), i));
        }
        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    /// Non-blocking queues deliver in push order from their worker
    #[test]
    fn test_e2e_async_delivery_order() {
        let (_bus, catalog) = discovered();
        let router = Arc::new(ExtractionRouter::with_catalog(
            catalog,
            resolver(),
            &ExtractionConfig::default(),
        ));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&router);
        let sink = Arc::clone(&seen);
        router.connect(SEQ_URL, move |url| {
            let Some(router) = weak.upgrade() else {
                return;
            };
            if let Some(sample) = router.get_latest(url) {
                sink.lock().push(sample.timestamp);
            }
        });

        for ts in 1..=10u64 {
            router.ingest(TOPIC, RawSample::copy_from(TOPIC, &payload(ts, 0.0), ts));
        }
        assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 10));
        assert_eq!(*seen.lock(), (1..=10).collect::<Vec<u64>>());
    }

    /// Resolution registered before the topic exists fires once on discovery
    #[test]
    fn test_e2e_resolve_then_ingest() {
        let bus = Arc::new(MockBus::new());
        let catalog = Arc::new(SignalCatalog::start(bus.clone(), catalog_config()).unwrap());
        let router = Arc::new(blocking_router(Arc::clone(&catalog)));

        let fired = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let fired_count = Arc::clone(&fired);
        let hit_count = Arc::clone(&hits);
        let target = Arc::clone(&router);
        catalog.resolve_when_available(
            SPEED_URL,
            Box::new(move |resolved| {
                assert_eq!(resolved.topic, TOPIC);
                fired_count.fetch_add(1, Ordering::SeqCst);
                target.connect(&resolved.url, move |_| {
                    hit_count.fetch_add(1, Ordering::SeqCst);
                });
            }),
        );
        assert_eq!(catalog.pending_resolutions(), 1);

        bus.publish(TOPIC, "sig:objects", radar_info(), Vec::new())
            .unwrap();
        catalog.notify_topics_changed();
        assert!(wait_until(Duration::from_secs(2), || fired.load(Ordering::SeqCst) == 1));

        router.ingest(TOPIC, RawSample::copy_from(TOPIC, &payload(1, 2.0), 1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.pending_resolutions(), 0);
    }

    /// A topic gone from the bus stops resolving after the staleness threshold
    #[test]
    fn test_e2e_stale_topic_evicted() {
        let (bus, catalog) = discovered();
        assert!(catalog.check_available(ROOT));

        bus.remove(TOPIC);
        assert!(wait_until(Duration::from_secs(3), || !catalog.check_available(ROOT)));
        assert!(catalog.metrics().evictions >= 1);
    }

    /// Loaded configuration drives catalog and router
    #[test]
    fn test_e2e_from_config() {
        let content = r#"
[catalog]
poll_interval_ms = 10
settle_window_ms = 20
settle_loop_sleep_ms = 5
stability_samples = 1
initial_fill_rounds = 1
sample_interval_ms = 1
max_sample_attempts = 5

[extraction]
max_history = 2
blocking = true
"#;
        let config = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();

        let bus = Arc::new(MockBus::new());
        bus.publish(TOPIC, "sig:objects", radar_info(), Vec::new())
            .unwrap();
        let catalog = Arc::new(SignalCatalog::start(bus, config.catalog.clone()).unwrap());
        let router = ExtractionRouter::with_catalog(catalog, resolver(), &config.extraction);

        for ts in [10u64, 20, 30] {
            router.ingest(TOPIC, RawSample::copy_from(TOPIC, &payload(ts, 0.0), ts));
        }
        let timestamps: Vec<u64> = router.history(TOPIC).iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![20, 30]);
    }

    /// Selection outcomes aggregate into the run summary
    #[test]
    fn test_e2e_selection_summary() {
        let (_bus, catalog) = discovered();
        let router = blocking_router(catalog);
        for sequence in [2u64, 4, 6] {
            router.ingest(TOPIC, RawSample::copy_from(TOPIC, &payload(sequence, 0.0), sequence));
        }
        router.set_sync_config(
            SEQ_URL,
            SyncConfig::new(SyncStrategyKind::NearestValue, SEQ_URL),
        );

        let mut aggregator = SelectionAggregator::new();
        for target in [5u64, 9] {
            let before = router.history(TOPIC).len();
            let found = router.get_synchronized(SEQ_URL, &[SyncValue::from(target)]);
            let obsolete = before - router.history(TOPIC).len();
            aggregator.record_selection(
                SyncStrategyKind::NearestValue.as_str(),
                found.is_some(),
                obsolete,
            );
        }

        let summary = aggregator.summary();
        assert_eq!(summary.total_selections, 2);
        assert_eq!(summary.found_selections, 1);
    }
}
