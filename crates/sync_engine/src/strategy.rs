//! Selection strategies over an ordered sample history.

use contracts::{ExtractedSample, FieldLayout, SyncStrategyKind};
use tracing::instrument;

/// Outcome of a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected sample, `None` when nothing matched
    pub sample: Option<ExtractedSample>,
    /// Entries at the front of the history that are now obsolete
    pub obsolete: usize,
}

impl Selection {
    fn found(sample: &ExtractedSample, obsolete: usize) -> Self {
        Self {
            sample: Some(sample.clone()),
            obsolete,
        }
    }

    fn not_found() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.sample.is_some()
    }
}

/// Read the compared field of `sample` as an unsigned little-endian integer
///
/// At most eight bytes are read. Returns `None` when the field lies outside
/// the payload.
pub fn field_value(sample: &ExtractedSample, layout: &FieldLayout) -> Option<u64> {
    let width = layout.byte_size.min(8);
    let end = layout.byte_offset.checked_add(width)?;
    let bytes = sample.payload.get(layout.byte_offset..end)?;

    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(bytes);
    Some(u64::from_le_bytes(buf))
}

/// Pick one sample out of `history` (oldest first)
///
/// `layout` locates the compared field for the value-based strategies and is
/// ignored by `Latest` and `ExactHeaderTimestamp`. A miss never reports
/// obsolete entries.
#[instrument(
    level = "trace",
    name = "sync_select",
    skip(history, layout),
    fields(strategy = kind.as_str(), history_len = history.len())
)]
pub fn select(
    kind: SyncStrategyKind,
    history: &[ExtractedSample],
    layout: &FieldLayout,
    target: u64,
) -> Selection {
    let selection = match kind {
        SyncStrategyKind::Latest => latest(history),
        SyncStrategyKind::ExactValue => exact_value(history, layout, target),
        SyncStrategyKind::NearestValue => nearest_value(history, layout, target),
        SyncStrategyKind::ExactHeaderTimestamp => exact_header_timestamp(history, target),
    };

    observability::record_sync_selection(kind.as_str(), selection.is_found(), selection.obsolete);
    selection
}

fn latest(history: &[ExtractedSample]) -> Selection {
    match history.last() {
        Some(sample) => Selection::found(sample, history.len() - 1),
        None => Selection::not_found(),
    }
}

fn exact_value(history: &[ExtractedSample], layout: &FieldLayout, target: u64) -> Selection {
    history
        .iter()
        .position(|sample| field_value(sample, layout) == Some(target))
        .map(|index| Selection::found(&history[index], index))
        .unwrap_or_else(Selection::not_found)
}

fn nearest_value(history: &[ExtractedSample], layout: &FieldLayout, target: u64) -> Selection {
    // Last readable element below the target; unreadable ones never match
    let mut below: Option<usize> = None;

    for (index, sample) in history.iter().enumerate() {
        let Some(value) = field_value(sample, layout) else {
            continue;
        };

        if value == target {
            return Selection::found(sample, index);
        }

        if value > target {
            return match below {
                Some(previous) => Selection::found(&history[previous], previous),
                None => Selection::found(sample, index),
            };
        }
        below = Some(index);
    }

    Selection::not_found()
}

fn exact_header_timestamp(history: &[ExtractedSample], target: u64) -> Selection {
    history
        .iter()
        .position(|sample| sample.timestamp == target)
        .map(|index| Selection::found(&history[index], index))
        .unwrap_or_else(Selection::not_found)
}
