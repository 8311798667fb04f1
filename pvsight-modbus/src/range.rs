//! Register ranges: contiguous spans satisfied by one read request.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::block::{ModelBlock, parse_block};
use crate::decode::ByteOrder;
use crate::descriptor::{FieldDescriptor, FieldId, ValueKind};
use crate::error::{ConstructionError, DecodeError};
use crate::transport::{ReadPurpose, ReadRequest};
use crate::value::{FieldUpdate, updates};

/// Maximum number of registers a single Modbus read request may cover.
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Modbus read function used for a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadFunction {
    /// Function code 0x03
    #[default]
    HoldingRegisters,
    /// Function code 0x04
    InputRegisters,
}

impl ReadFunction {
    pub fn code(&self) -> u8 {
        match self {
            ReadFunction::HoldingRegisters => 0x03,
            ReadFunction::InputRegisters => 0x04,
        }
    }
}

/// Value-equality identity of a range: function code, start address, length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub function: ReadFunction,
    pub start: u16,
    pub count: u16,
}

impl RangeKey {
    pub const fn new(function: ReadFunction, start: u16, count: u16) -> Self {
        Self {
            function,
            start,
            count,
        }
    }
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fc{:02}@{}+{}",
            self.function.code(),
            self.start,
            self.count
        )
    }
}

/// A validated, immutable group of field descriptors read in one request.
///
/// Two ranges are equal when their [`RangeKey`]s are equal, regardless of the
/// descriptors they serve.
#[derive(Debug, Clone)]
pub struct RegisterRange {
    key: RangeKey,
    fields: Vec<FieldDescriptor>,
}

impl RegisterRange {
    /// Build a holding-register range from a set of descriptors.
    pub fn new(fields: impl IntoIterator<Item = FieldDescriptor>) -> Result<Self, ConstructionError> {
        Self::with_function(ReadFunction::HoldingRegisters, fields)
    }

    /// Build a range read with the given function.
    ///
    /// Sorts by address and fails if the set is empty, a field has zero width,
    /// two fields overlap without aliasing the same registers, a scale factor
    /// is missing from the range, or the span exceeds
    /// [`MAX_REGISTERS_PER_READ`].
    pub fn with_function(
        function: ReadFunction,
        fields: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Result<Self, ConstructionError> {
        let mut fields: Vec<FieldDescriptor> = fields.into_iter().collect();
        if fields.is_empty() {
            return Err(ConstructionError::Empty);
        }

        // Stable: aliases keep their table order
        fields.sort_by_key(|f| f.address());

        if let Some(field) = fields.iter().find(|f| f.registers() == 0) {
            return Err(ConstructionError::ZeroWidth {
                field: field.id().clone(),
            });
        }

        for pair in fields.windows(2) {
            let (previous, field) = (&pair[0], &pair[1]);
            if u32::from(field.address()) < previous.end_address() && !field.aliases(previous) {
                return Err(ConstructionError::Overlap {
                    field: field.id().clone(),
                    previous: previous.id().clone(),
                    address: field.address(),
                });
            }
        }

        let start = fields[0].address();
        let end = fields
            .iter()
            .map(FieldDescriptor::end_address)
            .max()
            .unwrap_or(u32::from(start));
        let count = end - u32::from(start);

        if count > u32::from(MAX_REGISTERS_PER_READ) {
            return Err(ConstructionError::SpanTooLarge {
                start,
                count,
                max: MAX_REGISTERS_PER_READ,
            });
        }

        let factors: HashSet<&FieldId> = fields
            .iter()
            .filter(|f| f.kind() == ValueKind::ScaleFactor)
            .map(FieldDescriptor::id)
            .collect();

        for field in &fields {
            if let Some(factor) = field.scale_factor() {
                if !factors.contains(&factor) {
                    return Err(ConstructionError::UnresolvedScaleFactor {
                        field: field.id().clone(),
                        factor,
                    });
                }
            }
        }

        Ok(Self {
            key: RangeKey::new(function, start, count as u16),
            fields,
        })
    }

    pub fn key(&self) -> RangeKey {
        self.key
    }

    pub fn start_address(&self) -> u16 {
        self.key.start
    }

    pub fn register_count(&self) -> u16 {
        self.key.count
    }

    pub fn function(&self) -> ReadFunction {
        self.key.function
    }

    /// Descriptors served by this range, in ascending address order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn contains(&self, id: &FieldId) -> bool {
        self.fields.iter().any(|f| f.id() == id)
    }

    /// Build a read request for this range.
    pub fn read_request(&self, max_tries: u8, purpose: ReadPurpose) -> ReadRequest {
        ReadRequest {
            key: self.key,
            max_tries,
            purpose,
        }
    }

    /// Decode a raw buffer read for this range.
    pub fn parse(&self, buffer: &[u8], order: ByteOrder) -> Result<ModelBlock, DecodeError> {
        parse_block(self.key.start, &self.fields, buffer, order)
    }

    /// Decode a raw buffer and present every field.
    pub fn decode_updates(
        &self,
        buffer: &[u8],
        order: ByteOrder,
    ) -> Result<Vec<FieldUpdate>, DecodeError> {
        let block = self.parse(buffer, order)?;
        Ok(updates(&self.fields, &block))
    }
}

impl PartialEq for RegisterRange {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RegisterRange {}

impl Hash for RegisterRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Greedily pack descriptors into holding-register ranges.
///
/// A new range starts whenever the next field would push the span past
/// [`MAX_REGISTERS_PER_READ`] or leave more than `max_gap` unused registers
/// after the previous field. Scale factors must end up in the same range as
/// the fields that use them, otherwise construction fails.
pub fn pack_ranges(
    fields: impl IntoIterator<Item = FieldDescriptor>,
    max_gap: u16,
) -> Result<Vec<RegisterRange>, ConstructionError> {
    let mut fields: Vec<FieldDescriptor> = fields.into_iter().collect();
    if fields.is_empty() {
        return Err(ConstructionError::Empty);
    }
    fields.sort_by_key(|f| f.address());

    let mut ranges = Vec::new();
    let mut current: Vec<FieldDescriptor> = Vec::new();
    let mut start = 0u32;
    let mut end = 0u32;

    for field in fields {
        let address = u32::from(field.address());
        let fits = !current.is_empty()
            && address <= end + u32::from(max_gap)
            && field.end_address().max(end) - start <= u32::from(MAX_REGISTERS_PER_READ);

        if !fits && !current.is_empty() {
            ranges.push(RegisterRange::new(std::mem::take(&mut current))?);
        }
        if current.is_empty() {
            start = address;
            end = address;
        }

        end = end.max(field.end_address());
        current.push(field);
    }

    if !current.is_empty() {
        ranges.push(RegisterRange::new(current)?);
    }

    Ok(ranges)
}
