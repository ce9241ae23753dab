//! Synchronisation contracts
//!
//! Which strategy a consuming url uses and what target values it is called with.

use serde::{Deserialize, Serialize};

use crate::{ScalarType, SignalValue};

/// Selection policy for picking one sample out of a history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategyKind {
    /// Most recent sample
    #[default]
    Latest,
    /// First sample whose field equals the target
    ExactValue,
    /// Sample just below the first one exceeding the target
    NearestValue,
    /// First sample whose own timestamp equals the target
    ExactHeaderTimestamp,
}

impl SyncStrategyKind {
    /// Name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::ExactValue => "exact_value",
            Self::NearestValue => "nearest_value",
            Self::ExactHeaderTimestamp => "exact_header_timestamp",
        }
    }
}

/// Synchronisation configuration bound to one consuming url
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Selection policy
    #[serde(default)]
    pub strategy: SyncStrategyKind,

    /// Url whose value is compared, informational
    #[serde(default)]
    pub sync_url: String,

    /// Url whose layout locates the compared field inside the payload
    #[serde(default)]
    pub composition_url: String,
}

impl SyncConfig {
    /// Config for `strategy` comparing the field at `composition_url`
    pub fn new(strategy: SyncStrategyKind, composition_url: impl Into<String>) -> Self {
        let composition_url = composition_url.into();
        Self {
            strategy,
            sync_url: composition_url.clone(),
            composition_url,
        }
    }
}

/// Target value passed to a synchronised read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncValue {
    pub scalar_type: ScalarType,
    pub value: SignalValue,
}

impl SyncValue {
    /// Unsigned 64-bit comparison target
    #[inline]
    pub fn target(&self) -> u64 {
        self.value.as_u64()
    }
}

impl From<u64> for SyncValue {
    fn from(value: u64) -> Self {
        Self {
            scalar_type: ScalarType::U64,
            value: SignalValue::U64(value),
        }
    }
}
