//! SignalDescription - structural metadata of one topic

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::FormatType;

/// Header-level information about a topic
///
/// Decoded cheaply from the bus descriptor during discovery; enough to place
/// the topic in the device/view/group hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    /// Explicit base url of the package, overrides the device/view/group join
    #[serde(default)]
    pub parent_url: String,

    /// Device (data source) name
    pub device_name: String,

    /// View name within the device
    pub view_name: String,

    /// Group name within the view
    pub group_name: String,

    /// Package format announced by the producer
    #[serde(default)]
    pub format_type: FormatType,

    /// Producer mode
    #[serde(default)]
    pub mode: String,

    #[serde(default)]
    pub source_id: u16,

    #[serde(default)]
    pub instance_id: u32,

    #[serde(default)]
    pub cycle_id: u32,

    /// Virtual address of the package
    #[serde(default)]
    pub vaddr: u64,
}

impl BasicInfo {
    /// Root url of the topic (`device.view.group`), empty if it cannot be formed
    pub fn root_url(&self) -> String {
        if !self.parent_url.is_empty() {
            return self.parent_url.clone();
        }
        if self.device_name.is_empty() {
            return String::new();
        }
        [&self.device_name, &self.view_name, &self.group_name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Full description of a topic
///
/// Immutable once received. Only replaced when the topic's declared type name
/// changes, which starts a new cache generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalDescription {
    pub basic_info: BasicInfo,

    /// Opaque binary schema handed to the layout resolver
    pub binary_schema: Bytes,
}
