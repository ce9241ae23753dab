//! # Sync Engine
//!
//! Picks one sample out of a topic history according to a `SyncStrategyKind`.
//!
//! Pure functions, no threads. The caller owns the history and drains the
//! reported obsolete entries itself.
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::{select, SyncStrategyKind};
//!
//! let history = queue.pull_history();
//! let selection = select(SyncStrategyKind::ExactValue, &history, &layout, 5);
//! if let Some(sample) = selection.sample {
//!     queue.remove_oldest(selection.obsolete);
//!     // ...
//! }
//! ```

mod strategy;

pub use strategy::{field_value, select, Selection};

pub use contracts::{ExtractedSample, FieldLayout, SyncConfig, SyncStrategyKind, SyncValue};
