//! # Signal Catalog
//!
//! Background discovery of topics on the bus.
//!
//! Responsibilities:
//! - Poll the bus with a stability filter and track namespaced topics
//! - Age entries per discovery cycle and evict stale ones
//! - Resolve urls to topics and derive device/view/group listings
//! - Fire `resolve_when_available` registrations once their url appears
//!
//! ## Usage
//!
//! ```ignore
//! use signal_catalog::{MockBus, SignalCatalog};
//!
//! let bus = Arc::new(MockBus::new());
//! let catalog = SignalCatalog::start(bus, CatalogConfig::default())?;
//!
//! if catalog.check_available("radar.front.objects.count") {
//!     let description = catalog.describe("radar.front.objects.count");
//! }
//! ```

mod cache;
mod catalog;
mod discovery;
mod error;
mod hierarchy;
mod metrics;
mod mock;
mod resolve;

pub use cache::TopicCacheEntry;
pub use catalog::{ChangeNotifier, ResolveCallback, ResolvedSignal, SignalCatalog};
pub use contracts::{CatalogConfig, SignalDescription, TopicBus};
pub use error::{CatalogError, Result};
pub use hierarchy::{ChildInfo, HierarchyLevel};
pub use metrics::{CatalogMetrics, CatalogMetricsSnapshot};
pub use mock::MockBus;
pub use resolve::{group_url, strip_indices};
