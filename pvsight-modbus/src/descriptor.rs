//! Field descriptors: where a value lives in a register block and how to present it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a published value: a channel group and a channel name.
///
/// Displayed as `group#name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    pub group: String,
    pub name: String,
}

impl FieldId {
    /// Create a new field identity.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Parse a `group#name` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (group, name) = s.split_once('#')?;
        if group.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(group, name))
    }

    /// Build the identity of a sibling field in the same group.
    pub fn sibling(&self, name: &str) -> Self {
        Self::new(self.group.clone(), name)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.group, self.name)
    }
}

/// Binary layout of a value inside the register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Signed 16-bit integer (1 register)
    Int16,
    /// Unsigned 16-bit integer (1 register)
    UInt16,
    /// Signed 32-bit integer (2 registers)
    Int32,
    /// Unsigned 32-bit integer (2 registers)
    UInt32,
    /// IEEE-754 single precision float (2 registers)
    Float32,
    /// Fixed-length US-ASCII string spanning the given number of registers
    Text { registers: u16 },
    /// SunSpec `sunssf` scale factor: a signed 16-bit power of ten (1 register)
    ScaleFactor,
}

impl ValueKind {
    /// Number of 16-bit registers this kind occupies.
    pub const fn registers(&self) -> u16 {
        match self {
            ValueKind::Int16 | ValueKind::UInt16 | ValueKind::ScaleFactor => 1,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => 2,
            ValueKind::Text { registers } => *registers,
        }
    }

    /// Number of bytes this kind occupies.
    pub const fn bytes(&self) -> usize {
        self.registers() as usize * 2
    }

    /// Whether the device byte-order flag applies to this kind.
    ///
    /// Only multi-register numbers are affected; a single register is the
    /// atomic transport unit and strings are plain byte sequences.
    pub const fn is_word_ordered(&self) -> bool {
        matches!(
            self,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32
        )
    }
}

/// Physical unit carried alongside a decimal value as metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "W")]
    Watt,
    #[serde(rename = "Wh")]
    WattHour,
    #[serde(rename = "V")]
    Volt,
    #[serde(rename = "A")]
    Ampere,
    #[serde(rename = "Ah")]
    AmpereHour,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "K")]
    Kelvin,
    #[serde(rename = "var")]
    Var,
    #[serde(rename = "VA")]
    VoltAmpere,
}

impl Unit {
    /// Unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Watt => "W",
            Unit::WattHour => "Wh",
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::AmpereHour => "Ah",
            Unit::Percent => "%",
            Unit::Kelvin => "K",
            Unit::Var => "var",
            Unit::VoltAmpere => "VA",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Fixed linear transform applied after raw decoding (`value * scale + offset`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    pub scale: f64,
    pub offset: f64,
}

/// Degrees Celsius to Kelvin.
pub const CELSIUS_TO_KELVIN: LinearTransform = LinearTransform {
    scale: 1.0,
    offset: 273.15,
};

impl LinearTransform {
    /// Apply the transform.
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Lookup table from a decoded integer to a human-readable label.
#[derive(Debug, PartialEq, Eq)]
pub struct LabelTable {
    entries: &'static [(i64, &'static str)],
    fallback: &'static str,
}

impl LabelTable {
    /// Create a table; `fallback` is returned for unmapped codes.
    pub const fn new(entries: &'static [(i64, &'static str)], fallback: &'static str) -> Self {
        Self { entries, fallback }
    }

    /// Resolve a code to its label.
    pub fn label(&self, code: i64) -> &'static str {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
            .unwrap_or(self.fallback)
    }
}

/// How a decoded field becomes a published value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presentation {
    /// The number itself (after the optional linear transform).
    Decimal,
    /// `raw * 10^sf` where `sf` is the named scale-factor field of the same group.
    Scaled { factor: &'static str },
    /// A label looked up from the integer value.
    Label(&'static LabelTable),
    /// Raw text.
    Text,
}

/// Immutable description of one logical value inside a register block.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    address: u16,
    kind: ValueKind,
    id: FieldId,
    optional: bool,
    presentation: Presentation,
    unit: Option<Unit>,
    transform: Option<LinearTransform>,
}

impl FieldDescriptor {
    /// Create a mandatory field at an absolute register address.
    pub fn new(
        address: u16,
        kind: ValueKind,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let presentation = match kind {
            ValueKind::Text { .. } => Presentation::Text,
            _ => Presentation::Decimal,
        };

        Self {
            address,
            kind,
            id: FieldId::new(group, name),
            optional: false,
            presentation,
            unit: None,
            transform: None,
        }
    }

    /// Mark the field optional: its "not implemented" sentinel decodes to undefined.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach a unit tag.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Scale by the named scale-factor field of the same group.
    pub fn scaled_by(mut self, factor: &'static str) -> Self {
        self.presentation = Presentation::Scaled { factor };
        self
    }

    /// Present the value as a label from the given table.
    pub fn with_labels(mut self, table: &'static LabelTable) -> Self {
        self.presentation = Presentation::Label(table);
        self
    }

    /// Apply a linear transform before publishing.
    pub fn with_transform(mut self, transform: LinearTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn id(&self) -> &FieldId {
        &self.id
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    pub fn transform(&self) -> Option<LinearTransform> {
        self.transform
    }

    /// Register width of the field.
    pub fn registers(&self) -> u16 {
        self.kind.registers()
    }

    /// First register address after this field.
    pub fn end_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.registers())
    }

    /// Identity of the scale-factor field this one depends on, if any.
    pub fn scale_factor(&self) -> Option<FieldId> {
        match self.presentation {
            Presentation::Scaled { factor } => Some(self.id.sibling(factor)),
            _ => None,
        }
    }

    /// Whether this descriptor reads exactly the same registers as `other`.
    pub fn aliases(&self, other: &FieldDescriptor) -> bool {
        self.address == other.address && self.kind == other.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static STATES: LabelTable = LabelTable::new(&[(0, "Off"), (6, "FeedIn")], "Undefined");

    #[test]
    fn test_field_id_parse_and_display() {
        let id = FieldId::parse("consumption#total-dc-power").unwrap();
        assert_eq!(id, FieldId::new("consumption", "total-dc-power"));
        assert_eq!(id.to_string(), "consumption#total-dc-power");

        assert!(FieldId::parse("no-separator").is_none());
        assert!(FieldId::parse("#name").is_none());
    }

    #[test]
    fn test_value_kind_widths() {
        assert_eq!(ValueKind::UInt16.registers(), 1);
        assert_eq!(ValueKind::ScaleFactor.registers(), 1);
        assert_eq!(ValueKind::Float32.registers(), 2);
        assert_eq!(ValueKind::Text { registers: 8 }.bytes(), 16);

        assert!(ValueKind::UInt32.is_word_ordered());
        assert!(!ValueKind::Int16.is_word_ordered());
        assert!(!ValueKind::Text { registers: 2 }.is_word_ordered());
    }

    #[test]
    fn test_descriptor_builder() {
        let field = FieldDescriptor::new(40072, ValueKind::UInt16, "battery", "AHRtg")
            .optional()
            .with_unit(Unit::AmpereHour)
            .scaled_by("AHRtg_SF");

        assert!(field.is_optional());
        assert_eq!(field.end_address(), 40073);
        assert_eq!(
            field.scale_factor(),
            Some(FieldId::new("battery", "AHRtg_SF"))
        );
    }

    #[test]
    fn test_text_defaults_to_text_presentation() {
        let field = FieldDescriptor::new(6, ValueKind::Text { registers: 8 }, "info", "article");
        assert_eq!(field.presentation(), Presentation::Text);
    }

    #[test]
    fn test_label_table_fallback() {
        assert_eq!(STATES.label(6), "FeedIn");
        assert_eq!(STATES.label(19), "Undefined");
    }

    #[test]
    fn test_celsius_to_kelvin() {
        assert!((CELSIUS_TO_KELVIN.apply(25.0) - 298.15).abs() < 1e-9);
    }
}
