//! Typed decoding of payload fields

use contracts::{FieldLayout, ScalarType, SignalValue};

/// Decode one element from exactly `scalar.size()` little-endian bytes
pub fn decode_element(bytes: &[u8], scalar: ScalarType) -> Option<SignalValue> {
    let value = match scalar {
        ScalarType::Bool => SignalValue::Bool(*bytes.first()? != 0),
        ScalarType::Char => SignalValue::Char(*bytes.first()?),
        ScalarType::U8 => SignalValue::U8(*bytes.first()?),
        ScalarType::I8 => SignalValue::I8(i8::from_le_bytes([*bytes.first()?])),
        ScalarType::U16 => SignalValue::U16(u16::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::I16 => SignalValue::I16(i16::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::U32 => SignalValue::U32(u32::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::I32 => SignalValue::I32(i32::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::U64 => SignalValue::U64(u64::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::I64 => SignalValue::I64(i64::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::F32 => SignalValue::F32(f32::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::F64 => SignalValue::F64(f64::from_le_bytes(bytes.try_into().ok()?)),
        ScalarType::Struct => return None,
    };
    Some(value)
}

/// Element size of `scalar` if it matches the layout
fn checked_size(layout: &FieldLayout, scalar: ScalarType) -> Option<usize> {
    let size = scalar.size()?;
    (size == layout.element_size()).then_some(size)
}

/// First element of the field as `scalar`
///
/// `None` when the requested type size differs from the field's element size
/// or the field lies outside the payload.
pub fn decode_scalar(payload: &[u8], layout: &FieldLayout, scalar: ScalarType) -> Option<SignalValue> {
    let size = checked_size(layout, scalar)?;
    let start = layout.byte_offset;
    decode_element(payload.get(start..start.checked_add(size)?)?, scalar)
}

/// Every element of an array field as `scalar`
pub fn decode_vector(
    payload: &[u8],
    layout: &FieldLayout,
    scalar: ScalarType,
) -> Option<Vec<SignalValue>> {
    let size = checked_size(layout, scalar)?;
    let bytes = payload.get(layout.byte_offset..layout.end())?;
    bytes
        .chunks_exact(size)
        .map(|chunk| decode_element(chunk, scalar))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalar() {
        let mut payload = vec![0u8; 2];
        payload.extend_from_slice(&(-5i32).to_le_bytes());
        let layout = FieldLayout::scalar(2, ScalarType::I32);

        assert_eq!(
            decode_scalar(&payload, &layout, ScalarType::I32),
            Some(SignalValue::I32(-5))
        );
        // Same size, different interpretation
        assert_eq!(
            decode_scalar(&payload, &layout, ScalarType::U32),
            Some(SignalValue::U32((-5i32) as u32))
        );
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let payload = [0u8; 16];
        let layout = FieldLayout::scalar(0, ScalarType::U32);
        assert_eq!(decode_scalar(&payload, &layout, ScalarType::U16), None);
        assert_eq!(decode_scalar(&payload, &layout, ScalarType::F64), None);
    }

    #[test]
    fn test_field_outside_payload() {
        let payload = [0u8; 3];
        let layout = FieldLayout::scalar(0, ScalarType::U32);
        assert_eq!(decode_scalar(&payload, &layout, ScalarType::U32), None);
    }

    #[test]
    fn test_decode_vector() {
        let payload: Vec<u8> = [1u16, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let layout = FieldLayout::array(0, ScalarType::U16, 3);

        assert_eq!(
            decode_vector(&payload, &layout, ScalarType::U16),
            Some(vec![
                SignalValue::U16(1),
                SignalValue::U16(2),
                SignalValue::U16(3)
            ])
        );
        assert_eq!(decode_vector(&payload[..4], &layout, ScalarType::U16), None);
    }

    #[test]
    fn test_struct_is_not_decodable() {
        assert_eq!(decode_element(&[0], ScalarType::Struct), None);
    }
}
