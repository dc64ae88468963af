use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Scalar element types that can be streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Float32,
    Float64,
}

/// Header token table in decode-priority order.
///
/// Tokens are matched by prefix, so the `Unsigned*` names are tested before
/// the names they end with.
const TOKENS: [(&str, ElementType); 6] = [
    ("UnsignedByte", ElementType::UInt8),
    ("UnsignedShort", ElementType::UInt16),
    ("Byte", ElementType::Int8),
    ("Short", ElementType::Int16),
    ("Float", ElementType::Float32),
    ("Double", ElementType::Float64),
];

impl ElementType {
    pub const ALL: [ElementType; 6] = [
        ElementType::Int8,
        ElementType::UInt8,
        ElementType::Int16,
        ElementType::UInt16,
        ElementType::Float32,
        ElementType::Float64,
    ];

    /// Bytes per element on the wire.
    pub fn size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }

    /// Header token naming this type.
    pub fn token(self) -> &'static str {
        match self {
            ElementType::Int8 => "Byte",
            ElementType::UInt8 => "UnsignedByte",
            ElementType::Int16 => "Short",
            ElementType::UInt16 => "UnsignedShort",
            ElementType::Float32 => "Float",
            ElementType::Float64 => "Double",
        }
    }

    /// Resolve a header token; the first table entry the token starts with wins.
    pub fn from_token(token: &str) -> Option<Self> {
        TOKENS
            .iter()
            .find(|(name, _)| token.starts_with(name))
            .map(|(_, ty)| *ty)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One physical storage buffer holding elements of a single type.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl Buffer {
    /// Zero-filled buffer of `len` elements.
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::Int8 => Buffer::Int8(vec![0; len]),
            ElementType::UInt8 => Buffer::UInt8(vec![0; len]),
            ElementType::Int16 => Buffer::Int16(vec![0; len]),
            ElementType::UInt16 => Buffer::UInt16(vec![0; len]),
            ElementType::Float32 => Buffer::Float32(vec![0.0; len]),
            ElementType::Float64 => Buffer::Float64(vec![0.0; len]),
        }
    }

    /// Zero-filled buffer of `len` elements, failing instead of aborting
    /// when the memory cannot be reserved.
    pub fn try_zeros(element_type: ElementType, len: usize) -> Result<Self> {
        Ok(match element_type {
            ElementType::Int8 => Buffer::Int8(try_filled(len, 0)?),
            ElementType::UInt8 => Buffer::UInt8(try_filled(len, 0)?),
            ElementType::Int16 => Buffer::Int16(try_filled(len, 0)?),
            ElementType::UInt16 => Buffer::UInt16(try_filled(len, 0)?),
            ElementType::Float32 => Buffer::Float32(try_filled(len, 0.0)?),
            ElementType::Float64 => Buffer::Float64(try_filled(len, 0.0)?),
        })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Buffer::Int8(_) => ElementType::Int8,
            Buffer::UInt8(_) => ElementType::UInt8,
            Buffer::Int16(_) => ElementType::Int16,
            Buffer::UInt16(_) => ElementType::UInt16,
            Buffer::Float32(_) => ElementType::Float32,
            Buffer::Float64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Int8(v) => v.len(),
            Buffer::UInt8(v) => v.len(),
            Buffer::Int16(v) => v.len(),
            Buffer::UInt16(v) => v.len(),
            Buffer::Float32(v) => v.len(),
            Buffer::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Buffer::Int8(v) => v.get(index).map(|x| f64::from(*x)),
            Buffer::UInt8(v) => v.get(index).map(|x| f64::from(*x)),
            Buffer::Int16(v) => v.get(index).map(|x| f64::from(*x)),
            Buffer::UInt16(v) => v.get(index).map(|x| f64::from(*x)),
            Buffer::Float32(v) => v.get(index).map(|x| f64::from(*x)),
            Buffer::Float64(v) => v.get(index).copied(),
        }
    }

    /// Store `value` at `index`, converting with `as` semantics
    /// (integers saturate, floats round to nearest).
    pub fn set(&mut self, index: usize, value: f64) -> bool {
        match self {
            Buffer::Int8(v) => store(v, index, value as i8),
            Buffer::UInt8(v) => store(v, index, value as u8),
            Buffer::Int16(v) => store(v, index, value as i16),
            Buffer::UInt16(v) => store(v, index, value as u16),
            Buffer::Float32(v) => store(v, index, value as f32),
            Buffer::Float64(v) => store(v, index, value),
        }
    }
}

fn try_filled<T: Clone>(len: usize, zero: T) -> Result<Vec<T>> {
    let mut values = Vec::new();
    values.try_reserve_exact(len).map_err(|err| {
        CodecError::validation(format!("cannot allocate a buffer of {len} elements: {err}"))
    })?;
    values.resize(len, zero);
    Ok(values)
}

fn store<T>(slot: &mut [T], index: usize, value: T) -> bool {
    match slot.get_mut(index) {
        Some(cell) => {
            *cell = value;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_table_is_bidirectional() {
        for ty in ElementType::ALL {
            assert_eq!(ElementType::from_token(ty.token()), Some(ty));
        }
    }

    #[test]
    fn prefix_match_accepts_suffixed_tokens() {
        assert_eq!(ElementType::from_token("FloatType"), Some(ElementType::Float32));
        assert_eq!(
            ElementType::from_token("UnsignedShortType"),
            Some(ElementType::UInt16)
        );
        assert_eq!(ElementType::from_token("ByteType"), Some(ElementType::Int8));
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert_eq!(ElementType::from_token("Long"), None);
        assert_eq!(ElementType::from_token("byte"), None);
        assert_eq!(ElementType::from_token(""), None);
    }

    #[test]
    fn sizes() {
        let sizes: Vec<usize> = ElementType::ALL.iter().map(|t| t.size()).collect();
        assert_eq!(sizes, vec![1, 1, 2, 2, 4, 8]);
    }

    #[test]
    fn unreservable_buffer_is_an_error() {
        let err = Buffer::try_zeros(ElementType::Float64, usize::MAX).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));

        let buf = Buffer::try_zeros(ElementType::UInt16, 5).unwrap();
        assert_eq!(buf, Buffer::zeros(ElementType::UInt16, 5));
    }

    #[test]
    fn buffer_get_set_converts() {
        let mut buf = Buffer::zeros(ElementType::UInt8, 3);
        assert!(buf.set(1, 300.0));
        assert_eq!(buf.get(1), Some(255.0));
        assert!(!buf.set(3, 1.0));
        assert_eq!(buf.get(3), None);

        let mut buf = Buffer::zeros(ElementType::Int16, 2);
        buf.set(0, -1234.0);
        assert_eq!(buf, Buffer::Int16(vec![-1234, 0]));
        assert_eq!(buf.element_type(), ElementType::Int16);
    }
}
