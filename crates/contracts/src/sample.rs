//! Raw and extracted samples
//!
//! `RawSample` is what the subscription layer hands to the router; `ExtractedSample`
//! is what a topic queue keeps in its history and hands back to consumers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::TopicName;

/// Package format announced by the producer of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    #[default]
    Unknown,
    Timebase,
    GpsGeneric,
    GpsNmea,
    Can,
    Flexray,
    Refcam,
    Eth,
    Ibeo,
    Ct4,
    Xcp,
    Rtrange,
    Mta,
    MtaSw,
    MtaHw,
}

impl FormatType {
    /// Parse a format name (`"can"`, `"mta_sw"`, ...), case-insensitive.
    ///
    /// Unrecognised names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "timebase" => Self::Timebase,
            "gps_generic" => Self::GpsGeneric,
            "gps_nmea" => Self::GpsNmea,
            "can" => Self::Can,
            "flexray" => Self::Flexray,
            "refcam" => Self::Refcam,
            "eth" => Self::Eth,
            "ibeo" => Self::Ibeo,
            "ct4" => Self::Ct4,
            "xcp" => Self::Xcp,
            "rtrange" => Self::Rtrange,
            "mta" => Self::Mta,
            "mta_sw" => Self::MtaSw,
            "mta_hw" => Self::MtaHw,
            _ => Self::Unknown,
        }
    }
}

/// Raw sample as received from the bus
///
/// The payload is owned; constructing from a slice copies it so the producer
/// can reuse its buffer immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Topic the sample was received on
    pub topic: TopicName,

    /// Raw payload bytes
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// Bus network timestamp
    pub timestamp: u64,

    /// Format of the payload as announced by the producer
    #[serde(default)]
    pub format_type: FormatType,

    /// Producer requested post-processing before extraction
    #[serde(default)]
    pub requires_post_processing: bool,
}

impl RawSample {
    /// Copy `payload` into a new raw sample with unknown format
    pub fn copy_from(topic: impl Into<TopicName>, payload: &[u8], timestamp: u64) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.to_vec(),
            timestamp,
            format_type: FormatType::Unknown,
            requires_post_processing: false,
        }
    }

    /// Set the announced format
    pub fn with_format(mut self, format_type: FormatType) -> Self {
        self.format_type = format_type;
        self
    }

    /// Payload size in bytes
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }
}

/// Converted sample held in a topic history
///
/// Cloning shares the payload buffer; the history and every caller that pulled
/// the sample see the same immutable bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSample {
    /// Converted payload
    pub payload: Bytes,

    /// Timestamp carried over from the raw sample
    pub timestamp: u64,
}

impl ExtractedSample {
    /// Create a new extracted sample
    pub fn new(payload: Bytes, timestamp: u64) -> Self {
        Self { payload, timestamp }
    }

    /// Payload size in bytes
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Package metadata a topic queue converts with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Producing device
    pub device_name: String,
    pub source_id: u16,
    pub instance_id: u32,
    pub cycle_id: u32,
    /// Format of incoming payloads
    pub format_type: FormatType,
    /// Payloads need post-processing
    pub requires_post_processing: bool,
}

/// Declared output struct a queue adapts converted payloads to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructTarget {
    /// Port/url the target applies to
    pub url: String,
    /// Declared size in bytes
    pub size: usize,
    /// Encoded version, see `config_loader::parse_struct_version`
    pub version: u32,
    /// Name of the converter the producer of this port uses
    pub converter: String,
}
