//! Field layouts and the LayoutResolver trait
//!
//! Layouts are produced by an external schema parser. This crate only fixes
//! their shape and the scalar types they can describe.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ContractError, FormatType, PackageInfo};

/// Scalar type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Char,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Nested struct, not decodable as a scalar
    Struct,
}

impl ScalarType {
    /// Size of one element in bytes, `None` for structs
    pub const fn size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Char | Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Struct => None,
        }
    }
}

/// Byte layout of one field inside a topic payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Offset from the start of the payload
    pub byte_offset: usize,
    /// Total size of the field (all array elements)
    pub byte_size: usize,
    pub scalar_type: ScalarType,
    /// Number of elements, 1 for scalars
    pub array_length: usize,
}

impl FieldLayout {
    /// Layout of a single scalar
    pub fn scalar(byte_offset: usize, scalar_type: ScalarType) -> Self {
        Self {
            byte_offset,
            byte_size: scalar_type.size().unwrap_or(0),
            scalar_type,
            array_length: 1,
        }
    }

    /// Layout of a fixed-length array of scalars
    pub fn array(byte_offset: usize, scalar_type: ScalarType, array_length: usize) -> Self {
        Self {
            byte_offset,
            byte_size: scalar_type.size().unwrap_or(0) * array_length,
            scalar_type,
            array_length,
        }
    }

    /// Size of one element, derived from the total size
    pub fn element_size(&self) -> usize {
        self.byte_size / self.array_length.max(1)
    }

    /// End offset (exclusive)
    pub fn end(&self) -> usize {
        self.byte_offset + self.byte_size
    }
}

/// Decoded typed value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    Bool(bool),
    Char(u8),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl SignalValue {
    /// Unsigned 64-bit view used for synchronisation comparisons
    pub fn as_u64(&self) -> u64 {
        match *self {
            Self::Bool(v) => v as u64,
            Self::Char(v) | Self::U8(v) => v as u64,
            Self::I8(v) => v as u64,
            Self::U16(v) => v as u64,
            Self::I16(v) => v as u64,
            Self::U32(v) => v as u64,
            Self::I32(v) => v as u64,
            Self::U64(v) => v,
            Self::I64(v) => v as u64,
            Self::F32(v) => v as u64,
            Self::F64(v) => v as u64,
        }
    }

    /// Scalar type this value was decoded as
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::Char(_) => ScalarType::Char,
            Self::U8(_) => ScalarType::U8,
            Self::I8(_) => ScalarType::I8,
            Self::U16(_) => ScalarType::U16,
            Self::I16(_) => ScalarType::I16,
            Self::U32(_) => ScalarType::U32,
            Self::I32(_) => ScalarType::I32,
            Self::U64(_) => ScalarType::U64,
            Self::I64(_) => ScalarType::I64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }
}

impl From<u64> for SignalValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

/// Schema parser collaborator
///
/// Resolves field urls to byte layouts and converts raw payloads into the
/// extraction representation. The default conversion is a plain copy.
pub trait LayoutResolver: Send + Sync {
    /// Resolve the layout of `url` inside `topic`'s payload
    ///
    /// Returns `None` when the url is unknown to the schema.
    fn resolve_layout(
        &self,
        topic: &str,
        url: &str,
        schema: &[u8],
        format_type: FormatType,
    ) -> Option<FieldLayout>;

    /// Convert a raw payload for extraction
    fn convert(
        &self,
        _topic: &str,
        payload: &[u8],
        _schema: &[u8],
        _package: &PackageInfo,
    ) -> Result<Bytes, ContractError> {
        Ok(Bytes::copy_from_slice(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(ScalarType::Bool.size(), Some(1));
        assert_eq!(ScalarType::I16.size(), Some(2));
        assert_eq!(ScalarType::F32.size(), Some(4));
        assert_eq!(ScalarType::U64.size(), Some(8));
        assert_eq!(ScalarType::Struct.size(), None);
    }

    #[test]
    fn test_array_layout() {
        let layout = FieldLayout::array(4, ScalarType::U16, 3);
        assert_eq!(layout.byte_size, 6);
        assert_eq!(layout.element_size(), 2);
        assert_eq!(layout.end(), 10);
    }

    #[test]
    fn test_value_u64_view() {
        assert_eq!(SignalValue::Bool(true).as_u64(), 1);
        assert_eq!(SignalValue::U32(7).as_u64(), 7);
        assert_eq!(SignalValue::F64(3.9).as_u64(), 3);
        assert_eq!(SignalValue::from(11u64).scalar_type(), ScalarType::U64);
    }
}
