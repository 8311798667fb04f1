//! Scaled-value decoding of raw register bytes.
//!
//! All functions here are pure: they take a byte window and return a typed
//! value, touching no shared state.

use serde::{Deserialize, Serialize};

use crate::descriptor::ValueKind;
use crate::error::DecodeError;

// SunSpec "not implemented" bit patterns, checked on optional fields only.
// Each kind matches its own SunSpec sentinel and nothing else: an optional
// UInt16 reading 0x8000 or an Int16 reading 0x7FFF is a real value.
pub const NOT_IMPLEMENTED_INT16: u16 = 0x8000;
pub const NOT_IMPLEMENTED_UINT16: u16 = 0xFFFF;
pub const NOT_IMPLEMENTED_INT32: u32 = 0x8000_0000;
pub const NOT_IMPLEMENTED_UINT32: u32 = 0xFFFF_FFFF;
pub const NOT_IMPLEMENTED_FLOAT32: u32 = 0x7FC0_0000;
pub const NOT_IMPLEMENTED_SUNSSF: u16 = 0x8000;

/// Register (word) order of 32-bit values on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Modbus default: high word first.
    #[default]
    BigEndian,
    /// Low word first. Bytes inside each register stay big-endian.
    LittleEndian,
}

impl ByteOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::BigEndian => "big endian",
            ByteOrder::LittleEndian => "little endian",
        }
    }
}

/// A decoded field before presentation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
    /// Optional field reporting "not implemented".
    Undefined,
}

impl FieldValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, FieldValue::Undefined)
    }

    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) | FieldValue::Undefined => None,
        }
    }

    /// Integer view of the value; floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Float(v) => Some(*v as i64),
            FieldValue::Text(_) | FieldValue::Undefined => None,
        }
    }
}

fn window(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(DecodeError::InsufficientData {
            offset,
            needed: len,
            available: buffer.len(),
        })
}

/// Read one register as an unsigned 16-bit value. Never swapped.
pub fn read_u16(buffer: &[u8], offset: usize) -> Result<u16, DecodeError> {
    let bytes = window(buffer, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Read two registers as an unsigned 32-bit value in the given word order.
pub fn read_u32(buffer: &[u8], offset: usize, order: ByteOrder) -> Result<u32, DecodeError> {
    let b = window(buffer, offset, 4)?;
    let bytes = match order {
        ByteOrder::BigEndian => [b[0], b[1], b[2], b[3]],
        ByteOrder::LittleEndian => [b[2], b[3], b[0], b[1]],
    };
    Ok(u32::from_be_bytes(bytes))
}

/// Read `registers` registers as US-ASCII, trimming trailing NUL/control bytes.
pub fn read_text(buffer: &[u8], offset: usize, registers: u16) -> Result<String, DecodeError> {
    let bytes = window(buffer, offset, usize::from(registers) * 2)?;
    let text: String = bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect();

    Ok(text.trim_end_matches(|c: char| c.is_control()).to_string())
}

/// Decode one field of the given kind at a byte offset.
///
/// Optional fields whose raw bits equal the kind's "not implemented" sentinel
/// decode to [`FieldValue::Undefined`]; mandatory fields decode literally.
pub fn decode_field(
    buffer: &[u8],
    offset: usize,
    kind: ValueKind,
    order: ByteOrder,
    optional: bool,
) -> Result<FieldValue, DecodeError> {
    let value = match kind {
        ValueKind::Int16 => {
            let raw = read_u16(buffer, offset)?;
            if optional && raw == NOT_IMPLEMENTED_INT16 {
                FieldValue::Undefined
            } else {
                FieldValue::Integer(i64::from(raw as i16))
            }
        }
        ValueKind::UInt16 => {
            let raw = read_u16(buffer, offset)?;
            if optional && raw == NOT_IMPLEMENTED_UINT16 {
                FieldValue::Undefined
            } else {
                FieldValue::Integer(i64::from(raw))
            }
        }
        ValueKind::ScaleFactor => {
            let raw = read_u16(buffer, offset)?;
            if optional && raw == NOT_IMPLEMENTED_SUNSSF {
                FieldValue::Undefined
            } else {
                FieldValue::Integer(i64::from(raw as i16))
            }
        }
        ValueKind::Int32 => {
            let raw = read_u32(buffer, offset, order)?;
            if optional && raw == NOT_IMPLEMENTED_INT32 {
                FieldValue::Undefined
            } else {
                FieldValue::Integer(i64::from(raw as i32))
            }
        }
        ValueKind::UInt32 => {
            let raw = read_u32(buffer, offset, order)?;
            if optional && raw == NOT_IMPLEMENTED_UINT32 {
                FieldValue::Undefined
            } else {
                FieldValue::Integer(i64::from(raw))
            }
        }
        ValueKind::Float32 => {
            let raw = read_u32(buffer, offset, order)?;
            if optional && raw == NOT_IMPLEMENTED_FLOAT32 {
                FieldValue::Undefined
            } else {
                FieldValue::Float(f64::from(f32::from_bits(raw)))
            }
        }
        ValueKind::Text { registers } => {
            let text = read_text(buffer, offset, registers)?;
            if optional && text.is_empty() {
                FieldValue::Undefined
            } else {
                FieldValue::Text(text)
            }
        }
    };

    Ok(value)
}

/// `raw * 10^exponent`.
///
/// Negative exponents divide by the exact power of ten so that e.g.
/// `1234 * 10^-2` yields the closest double to `12.34`.
pub fn apply_scale_factor(raw: f64, exponent: i32) -> f64 {
    if exponent < 0 {
        raw / 10f64.powi(-exponent)
    } else {
        raw * 10f64.powi(exponent)
    }
}

/// Combine a raw value with its scale factor; undefined if either side is.
pub fn scaled(raw: &FieldValue, factor: &FieldValue) -> Option<f64> {
    let value = raw.as_f64()?;
    match factor {
        FieldValue::Integer(sf) => i32::try_from(*sf)
            .ok()
            .map(|sf| apply_scale_factor(value, sf)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_u32(value: u32, order: ByteOrder) -> Vec<u8> {
        let b = value.to_be_bytes();
        match order {
            ByteOrder::BigEndian => b.to_vec(),
            ByteOrder::LittleEndian => vec![b[2], b[3], b[0], b[1]],
        }
    }

    #[test]
    fn test_integer_round_trip() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            for value in [0i32, 1, -1, i32::MIN, i32::MAX, 123_456] {
                let buf = encode_u32(value as u32, order);
                assert_eq!(
                    decode_field(&buf, 0, ValueKind::Int32, order, false).unwrap(),
                    FieldValue::Integer(i64::from(value))
                );
            }
            for value in [0u32, 1, u32::MAX, 0x8000_0000] {
                let buf = encode_u32(value, order);
                assert_eq!(
                    decode_field(&buf, 0, ValueKind::UInt32, order, false).unwrap(),
                    FieldValue::Integer(i64::from(value))
                );
            }
        }

        for value in [i16::MIN, -1, 0, 1, i16::MAX] {
            let buf = value.to_be_bytes();
            assert_eq!(
                decode_field(&buf, 0, ValueKind::Int16, ByteOrder::LittleEndian, false).unwrap(),
                FieldValue::Integer(i64::from(value))
            );
        }
    }

    #[test]
    fn test_float_round_trip() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            for value in [0.0f32, -1.5, 123.456, f32::MAX, f32::MIN_POSITIVE] {
                let buf = encode_u32(value.to_bits(), order);
                assert_eq!(
                    decode_field(&buf, 0, ValueKind::Float32, order, false).unwrap(),
                    FieldValue::Float(f64::from(value))
                );
            }
        }
    }

    #[test]
    fn test_little_endian_float_is_word_swapped() {
        // 123.456 = 0x42F6E979, big-endian wire order
        let wire = [0x42, 0xF6, 0xE9, 0x79];

        let big = decode_field(&wire, 0, ValueKind::Float32, ByteOrder::BigEndian, false).unwrap();
        assert!((big.as_f64().unwrap() - 123.456).abs() < 0.001);

        // The little-endian path swaps the two registers before interpreting
        let little =
            decode_field(&wire, 0, ValueKind::Float32, ByteOrder::LittleEndian, false).unwrap();
        assert_eq!(
            little,
            FieldValue::Float(f64::from(f32::from_bits(0xE979_42F6)))
        );
    }

    #[test]
    fn test_single_register_never_swapped() {
        let wire = [0x06, 0x01];
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            assert_eq!(
                decode_field(&wire, 0, ValueKind::UInt16, order, false).unwrap(),
                FieldValue::Integer(0x0601)
            );
        }
    }

    #[test]
    fn test_optional_sentinels_are_undefined() {
        let cases: [(ValueKind, Vec<u8>); 6] = [
            (ValueKind::Int16, vec![0x80, 0x00]),
            (ValueKind::UInt16, vec![0xFF, 0xFF]),
            (ValueKind::ScaleFactor, vec![0x80, 0x00]),
            (ValueKind::Int32, vec![0x80, 0x00, 0x00, 0x00]),
            (ValueKind::UInt32, vec![0xFF, 0xFF, 0xFF, 0xFF]),
            (ValueKind::Float32, vec![0x7F, 0xC0, 0x00, 0x00]),
        ];

        for (kind, buf) in &cases {
            assert_eq!(
                decode_field(buf, 0, *kind, ByteOrder::BigEndian, true).unwrap(),
                FieldValue::Undefined,
                "{:?}",
                kind
            );
            // Mandatory fields decode the same bits literally
            assert!(
                !decode_field(buf, 0, *kind, ByteOrder::BigEndian, false)
                    .unwrap()
                    .is_undefined()
            );
        }
    }

    #[test]
    fn test_optional_non_sentinel_is_literal() {
        assert_eq!(
            decode_field(&[0x7F, 0xFF], 0, ValueKind::Int16, ByteOrder::BigEndian, true).unwrap(),
            FieldValue::Integer(0x7FFF)
        );
        assert_eq!(
            decode_field(&[0x80, 0x00], 0, ValueKind::UInt16, ByteOrder::BigEndian, true).unwrap(),
            FieldValue::Integer(0x8000)
        );
        assert_eq!(
            decode_field(&[0x00, 0x00], 0, ValueKind::UInt16, ByteOrder::BigEndian, true).unwrap(),
            FieldValue::Integer(0)
        );
    }

    #[test]
    fn test_optional_sentinel_after_word_swap() {
        // 0x80000000 in little-endian word order
        let buf = [0x00, 0x00, 0x80, 0x00];
        assert_eq!(
            decode_field(&buf, 0, ValueKind::Int32, ByteOrder::LittleEndian, true).unwrap(),
            FieldValue::Undefined
        );
    }

    #[test]
    fn test_text_trims_trailing_nul() {
        let mut buf = b"PLENTICORE plus".to_vec();
        buf.resize(32, 0);
        assert_eq!(read_text(&buf, 0, 16).unwrap(), "PLENTICORE plus");

        assert_eq!(
            decode_field(&[0; 4], 0, ValueKind::Text { registers: 2 }, ByteOrder::BigEndian, true)
                .unwrap(),
            FieldValue::Undefined
        );
        assert_eq!(
            decode_field(&[0; 4], 0, ValueKind::Text { registers: 2 }, ByteOrder::BigEndian, false)
                .unwrap(),
            FieldValue::Text(String::new())
        );
    }

    #[test]
    fn test_text_replaces_non_ascii() {
        assert_eq!(read_text(&[b'A', 0xC3], 0, 1).unwrap(), "A\u{FFFD}");
    }

    #[test]
    fn test_insufficient_data() {
        let err = decode_field(&[0x00, 0x01, 0x02], 0, ValueKind::UInt32, ByteOrder::BigEndian, false)
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientData {
                offset: 0,
                needed: 4,
                available: 3
            }
        );

        assert!(read_u16(&[0x00, 0x01], 1).is_err());
        assert!(read_u16(&[], usize::MAX).is_err());
    }

    #[test]
    fn test_scale_factor_combination() {
        let raw = FieldValue::Integer(1234);
        let sf = FieldValue::Integer(-2);

        assert_eq!(scaled(&raw, &sf), Some(12.34));
        assert_eq!(scaled(&FieldValue::Undefined, &sf), None);
        assert_eq!(scaled(&raw, &FieldValue::Undefined), None);
        assert_eq!(scaled(&raw, &FieldValue::Integer(0)), Some(1234.0));
        assert_eq!(scaled(&raw, &FieldValue::Integer(2)), Some(123_400.0));
    }
}
