//! # Extractor
//!
//! Url-facing extraction layer.
//!
//! Responsibilities:
//! - Route raw samples to per-topic queues, created on first sight
//! - Register consumer callbacks by url
//! - Decode typed field values against cached layouts
//! - Serve synchronised reads through the sync strategies

pub mod directory;
pub mod error;
pub mod resolver;
pub mod router;
pub mod value;

pub use contracts::{FieldLayout, ScalarType, SignalValue, SyncConfig, SyncStrategyKind, SyncValue};
pub use directory::UrlDirectory;
pub use error::{ExtractorError, Result};
pub use resolver::StaticLayoutResolver;
pub use router::{CallbackInfo, ExtractionRouter};
pub use value::{decode_scalar, decode_vector};
