//! Raw payload conversion with size adaptation

use bytes::Bytes;
use contracts::{ContractError, LayoutResolver, PackageInfo, RawSample};

/// Trim padding from a converted payload
///
/// A payload larger than `target_size` by less than `threshold` bytes is cut
/// to `target_size`. Larger gaps, e.g. image payloads, pass through.
pub fn adapt_size(payload: Bytes, target_size: Option<usize>, threshold: usize) -> Bytes {
    match target_size {
        Some(size) if size > 0 && payload.len() > size && payload.len() - size < threshold => {
            payload.slice(..size)
        }
        _ => payload,
    }
}

/// Convert one raw sample through the layout resolver
pub(crate) fn convert_sample(
    resolver: &dyn LayoutResolver,
    raw: &RawSample,
    schema: &[u8],
    package: &PackageInfo,
    target_size: Option<usize>,
    threshold: usize,
) -> Result<Bytes, ContractError> {
    let converted = resolver.convert(&raw.topic, &raw.payload, schema, package)?;
    Ok(adapt_size(converted, target_size, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![1u8; len])
    }

    #[test]
    fn test_small_padding_is_trimmed() {
        assert_eq!(adapt_size(payload(36), Some(32), 8).len(), 32);
    }

    #[test]
    fn test_large_gap_passes_through() {
        assert_eq!(adapt_size(payload(4096), Some(32), 8).len(), 4096);
    }

    #[test]
    fn test_zero_threshold_disables_trimming() {
        assert_eq!(adapt_size(payload(33), Some(32), 0).len(), 33);
    }

    #[test]
    fn test_smaller_payload_untouched() {
        assert_eq!(adapt_size(payload(16), Some(32), 8).len(), 16);
        assert_eq!(adapt_size(payload(16), None, 8).len(), 16);
    }
}
