//! Register block parsing into model blocks.

use tracing::trace;

use crate::decode::{ByteOrder, FieldValue, decode_field};
use crate::descriptor::{FieldDescriptor, FieldId};
use crate::error::DecodeError;

/// Decoded snapshot of one register block read.
///
/// Holds one entry per descriptor, in ascending address order. Blocks are
/// created fresh per read and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBlock {
    start_address: u16,
    fields: Vec<(FieldId, FieldValue)>,
}

impl ModelBlock {
    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Look up a decoded field.
    pub fn get(&self, id: &FieldId) -> Option<&FieldValue> {
        self.fields.iter().find(|(f, _)| f == id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &FieldValue)> {
        self.fields.iter().map(|(id, value)| (id, value))
    }
}

/// Byte offset of a register inside a block starting at `start_address`.
pub fn byte_offset(address: u16, start_address: u16) -> Result<usize, DecodeError> {
    address
        .checked_sub(start_address)
        .map(|registers| usize::from(registers) * 2)
        .ok_or(DecodeError::OutsideBlock {
            address,
            start: start_address,
        })
}

/// Bytes a buffer must hold to cover every descriptor.
pub fn required_len(start_address: u16, fields: &[FieldDescriptor]) -> usize {
    fields
        .iter()
        .map(|f| f.end_address().saturating_sub(u32::from(start_address)) as usize * 2)
        .max()
        .unwrap_or(0)
}

/// Walk `buffer` over `fields` (ascending address order) and decode a model block.
///
/// The whole buffer length is checked before any field is decoded, so a short
/// read never yields a partial block.
pub fn parse_block(
    start_address: u16,
    fields: &[FieldDescriptor],
    buffer: &[u8],
    order: ByteOrder,
) -> Result<ModelBlock, DecodeError> {
    let required = required_len(start_address, fields);
    if buffer.len() < required {
        return Err(DecodeError::TruncatedBuffer {
            required,
            available: buffer.len(),
        });
    }

    let mut decoded = Vec::with_capacity(fields.len());
    let mut cursor = 0usize;

    for field in fields {
        let offset = byte_offset(field.address(), start_address)?;
        // Aliased descriptors re-read the previous field's registers
        if offset < cursor && offset + field.kind().bytes() != cursor {
            return Err(DecodeError::Unordered {
                field: field.id().clone(),
                address: field.address(),
            });
        }

        let value = decode_field(
            buffer,
            offset,
            field.kind(),
            order,
            field.is_optional(),
        )?;
        trace!(field = %field.id(), offset, ?value, "Decoded field");

        cursor = offset + field.kind().bytes();
        decoded.push((field.id().clone(), value));
    }

    Ok(ModelBlock {
        start_address,
        fields: decoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ValueKind;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new(100, ValueKind::UInt16, "g", "a"),
            FieldDescriptor::new(101, ValueKind::Int16, "g", "b").optional(),
            FieldDescriptor::new(104, ValueKind::UInt32, "g", "c"),
        ]
    }

    #[test]
    fn test_parse_block_with_gap() {
        // 100: 7, 101: 0x8000 (optional sentinel), 102-103: unused, 104-105: 70000
        let buf = [
            0x00, 0x07, 0x80, 0x00, 0xAA, 0xAA, 0xBB, 0xBB, 0x00, 0x01, 0x11, 0x70,
        ];

        let block = parse_block(100, &fields(), &buf, ByteOrder::BigEndian).unwrap();

        assert_eq!(block.len(), 3);
        assert_eq!(block.start_address(), 100);
        assert_eq!(
            block.get(&FieldId::new("g", "a")),
            Some(&FieldValue::Integer(7))
        );
        assert_eq!(
            block.get(&FieldId::new("g", "b")),
            Some(&FieldValue::Undefined)
        );
        assert_eq!(
            block.get(&FieldId::new("g", "c")),
            Some(&FieldValue::Integer(70_000))
        );
    }

    #[test]
    fn test_truncated_buffer() {
        let err = parse_block(100, &fields(), &[0u8; 10], ByteOrder::BigEndian).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedBuffer {
                required: 12,
                available: 10
            }
        );
    }

    #[test]
    fn test_aliased_fields_decode_same_registers() {
        let fields = vec![
            FieldDescriptor::new(56, ValueKind::UInt32, "info", "state"),
            FieldDescriptor::new(56, ValueKind::UInt32, "info", "state-raw"),
        ];
        let block =
            parse_block(56, &fields, &[0x00, 0x06, 0x00, 0x00], ByteOrder::LittleEndian).unwrap();

        assert_eq!(
            block.get(&FieldId::new("info", "state")),
            Some(&FieldValue::Integer(6))
        );
        assert_eq!(
            block.get(&FieldId::new("info", "state-raw")),
            Some(&FieldValue::Integer(6))
        );
    }

    #[test]
    fn test_unordered_fields_are_rejected() {
        let mut fields = fields();
        fields.swap(0, 2);

        let err = parse_block(100, &fields, &[0u8; 12], ByteOrder::BigEndian).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Unordered {
                field: FieldId::new("g", "b"),
                address: 101
            }
        );
    }

    #[test]
    fn test_byte_offset() {
        assert_eq!(byte_offset(104, 100).unwrap(), 8);
        assert!(byte_offset(99, 100).is_err());
    }
}
