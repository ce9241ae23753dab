//! # Contracts
//!
//! Frozen interface contracts shared by every sigflow crate: the sample and
//! description data model, the error taxonomy, configuration structs and the
//! traits through which the external collaborators (bus, layout resolver) plug in.
//! Business crates depend only on this crate, never on each other in reverse.
//!
//! ## Time Model
//! - Sample timestamps are bus network time as an unsigned 64-bit integer
//! - Synchronisation compares 8-byte unsigned views of either a payload field or
//!   the sample timestamp

mod bus;
mod cancel;
mod description;
mod error;
mod layout;
mod sample;
mod settings;
mod sync;
mod topic_name;

pub use bus::{TopicBus, TopicMetadata};
pub use cancel::CancellationToken;
pub use description::{BasicInfo, SignalDescription};
pub use error::*;
pub use layout::{FieldLayout, LayoutResolver, ScalarType, SignalValue};
pub use sample::*;
pub use settings::*;
pub use sync::*;
pub use topic_name::TopicName;
