//! Mock Pipeline Demo
//!
//! Wires a SignalCatalog and an ExtractionRouter over the in-memory MockBus.
//! A producer thread publishes radar samples; the main thread performs
//! synchronised reads and prints a selection summary.
//!
//! Run with: cargo run -p demos --bin mock_pipeline [-- sigflow.toml]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use config_loader::ConfigLoader;
use contracts::{
    BasicInfo, FieldLayout, FormatType, LogFormatKind, RawSample, ScalarType, SigflowConfig,
    SignalValue, SyncConfig, SyncStrategyKind, SyncValue,
};
use extractor::{ExtractionRouter, StaticLayoutResolver};
use observability::{ObservabilityConfig, SelectionAggregator};
use signal_catalog::{MockBus, SignalCatalog};

const RADAR_TOPIC: &str = "sig_radar_front";
const CAMERA_TOPIC: &str = "sig_camera_mono";
const SEQUENCE_URL: &str = "radar.front.objects.sequence";
const RANGE_URL: &str = "radar.front.objects.range";
const SAMPLES: u64 = 200;

fn main() -> anyhow::Result<()> {
    // ==== Stage 1: configuration ====
    let config = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::load_from_path(Path::new(&path))
            .with_context(|| format!("loading {path}"))?,
        None => demo_config(),
    };
    observability::init_with_config(ObservabilityConfig::from(&config.observability))?;
    tracing::info!("Starting mock pipeline demo");

    // ==== Stage 2: bus and catalog ====
    let bus = Arc::new(MockBus::new());
    bus.publish(RADAR_TOPIC, "sig:objects", info("radar", "front", "objects", FormatType::Can), Vec::new())?;
    bus.publish(CAMERA_TOPIC, "sig:image", info("camera", "mono", "image", FormatType::Refcam), Vec::new())?;

    let catalog = Arc::new(SignalCatalog::start(bus.clone(), config.catalog.clone())?);
    for (device, roots) in catalog.full_url_tree() {
        tracing::info!(device = %device, roots = ?roots, "discovered device");
    }

    // ==== Stage 3: router ====
    let resolver = Arc::new(
        StaticLayoutResolver::new()
            .with_field("radar.front.objects", FieldLayout::array(0, ScalarType::U8, 12))
            .with_field(SEQUENCE_URL, FieldLayout::scalar(0, ScalarType::U64))
            .with_field(RANGE_URL, FieldLayout::scalar(8, ScalarType::F32)),
    );
    let router = Arc::new(ExtractionRouter::with_catalog(
        Arc::clone(&catalog),
        resolver,
        &config.extraction,
    ));
    router.set_sync_config(
        SEQUENCE_URL,
        SyncConfig::new(SyncStrategyKind::NearestValue, SEQUENCE_URL),
    );

    let delivered = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&delivered);
    router.connect(RANGE_URL, move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    // ==== Stage 4: producer ====
    let producer_router = Arc::clone(&router);
    let producer = thread::Builder::new()
        .name("demo-producer".to_string())
        .spawn(move || {
            for sequence in 0..SAMPLES {
                let range = 10.0 + (sequence as f32 * 0.1).sin();
                let raw = RawSample::copy_from(RADAR_TOPIC, &payload(sequence * 2, range), sequence)
                    .with_format(FormatType::Can);
                if !producer_router.ingest(RADAR_TOPIC, raw) {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
        })?;

    // ==== Stage 5: synchronised reads ====
    let mut aggregator = SelectionAggregator::new();
    let started = Instant::now();
    for target in (0..SAMPLES * 2).step_by(7) {
        let cycle_started = Instant::now();
        let before = router.history(RADAR_TOPIC).len();
        let selected = router.get_synchronized(SEQUENCE_URL, &[SyncValue::from(target)]);
        let after = router.history(RADAR_TOPIC).len();
        aggregator.record_selection(
            SyncStrategyKind::NearestValue.as_str(),
            selected.is_some(),
            before.saturating_sub(after),
        );
        aggregator.record_cycle(cycle_started.elapsed().as_secs_f64() * 1000.0);

        if let (Some(sample), Some(SignalValue::F32(range))) =
            (selected, router.get_value(RANGE_URL, ScalarType::F32))
        {
            tracing::debug!(sync_target = target, timestamp = sample.timestamp, range, "synchronised read");
        }
        thread::sleep(Duration::from_millis(5));
    }

    if producer.join().is_err() {
        tracing::error!("producer thread panicked");
    }

    // ==== Stage 6: summary ====
    println!("{}", aggregator.summary());
    println!(
        "callbacks delivered: {}, elapsed: {:?}, catalog: {:?}",
        delivered.load(Ordering::Relaxed),
        started.elapsed(),
        catalog.metrics()
    );
    if let Ok(metrics) = router.queue_metrics(RADAR_TOPIC) {
        println!("radar queue: {metrics:?}");
    }

    Ok(())
}

fn demo_config() -> SigflowConfig {
    let mut config = SigflowConfig::default();
    config.catalog.poll_interval_ms = 50;
    config.catalog.stability_samples = 2;
    config.catalog.initial_fill_rounds = 2;
    config.catalog.sample_interval_ms = 5;
    config.extraction.max_history = 50;
    config.observability.log_format = LogFormatKind::Compact;
    config.observability.metrics_port = None;
    config
}

fn info(device: &str, view: &str, group: &str, format_type: FormatType) -> BasicInfo {
    BasicInfo {
        device_name: device.into(),
        view_name: view.into(),
        group_name: group.into(),
        format_type,
        ..Default::default()
    }
}

fn payload(sequence: u64, range: f32) -> Vec<u8> {
    let mut bytes = sequence.to_le_bytes().to_vec();
    bytes.extend_from_slice(&range.to_le_bytes());
    bytes
}
