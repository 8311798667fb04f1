//! Published values and the presentation step.

use serde::{Deserialize, Serialize};

use crate::block::ModelBlock;
use crate::decode::{FieldValue, scaled};
use crate::descriptor::{FieldDescriptor, FieldId, Presentation, Unit};

/// Value handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// Number, optionally tagged with a unit.
    Decimal {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<Unit>,
    },

    /// Text or enumerated label.
    Text(String),

    /// Not implemented by the device, or derived from an undefined input.
    Undefined,
}

impl DecodedValue {
    pub fn decimal(value: f64, unit: Option<Unit>) -> Self {
        DecodedValue::Decimal { value, unit }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, DecodedValue::Undefined)
    }
}

/// A value to publish under a field identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: FieldId,
    pub value: DecodedValue,
}

/// Resolve a descriptor's presentation against a decoded block.
pub fn present(field: &FieldDescriptor, block: &ModelBlock) -> DecodedValue {
    let Some(raw) = block.get(field.id()) else {
        return DecodedValue::Undefined;
    };

    let number = match field.presentation() {
        Presentation::Decimal => raw.as_f64(),
        Presentation::Scaled { factor } => {
            let factor = block
                .get(&field.id().sibling(factor))
                .unwrap_or(&FieldValue::Undefined);
            scaled(raw, factor)
        }
        Presentation::Label(table) => {
            return match raw.as_i64() {
                Some(code) => DecodedValue::Text(table.label(code).to_string()),
                None => DecodedValue::Undefined,
            };
        }
        Presentation::Text => {
            return match raw {
                FieldValue::Text(text) => DecodedValue::Text(text.clone()),
                FieldValue::Integer(v) => DecodedValue::Text(v.to_string()),
                FieldValue::Float(v) => DecodedValue::Text(v.to_string()),
                FieldValue::Undefined => DecodedValue::Undefined,
            };
        }
    };

    match (number, raw) {
        (Some(value), _) => {
            let value = field.transform().map_or(value, |t| t.apply(value));
            DecodedValue::decimal(value, field.unit())
        }
        (None, FieldValue::Text(text)) => DecodedValue::Text(text.clone()),
        (None, _) => DecodedValue::Undefined,
    }
}

/// Turn a decoded block into one update per descriptor.
pub fn updates(fields: &[FieldDescriptor], block: &ModelBlock) -> Vec<FieldUpdate> {
    fields
        .iter()
        .map(|field| FieldUpdate {
            field: field.id().clone(),
            value: present(field, block),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::parse_block;
    use crate::decode::ByteOrder;
    use crate::descriptor::{CELSIUS_TO_KELVIN, LabelTable, ValueKind};

    static STATES: LabelTable = LabelTable::new(&[(6, "FeedIn")], "Undefined");

    fn block(fields: &[FieldDescriptor], buf: &[u8]) -> ModelBlock {
        parse_block(fields[0].address(), fields, buf, ByteOrder::BigEndian).unwrap()
    }

    #[test]
    fn test_scaled_presentation() {
        let fields = vec![
            FieldDescriptor::new(0, ValueKind::UInt16, "battery", "V")
                .with_unit(Unit::Volt)
                .scaled_by("V_SF"),
            FieldDescriptor::new(1, ValueKind::ScaleFactor, "battery", "V_SF").optional(),
        ];

        // 1234, sf -2
        let b = block(&fields, &[0x04, 0xD2, 0xFF, 0xFE]);
        assert_eq!(
            present(&fields[0], &b),
            DecodedValue::decimal(12.34, Some(Unit::Volt))
        );
        assert_eq!(present(&fields[1], &b), DecodedValue::decimal(-2.0, None));

        // Scale factor not implemented
        let b = block(&fields, &[0x04, 0xD2, 0x80, 0x00]);
        assert_eq!(present(&fields[0], &b), DecodedValue::Undefined);
        assert_eq!(present(&fields[1], &b), DecodedValue::Undefined);
    }

    #[test]
    fn test_undefined_raw_with_defined_factor() {
        let fields = vec![
            FieldDescriptor::new(0, ValueKind::UInt16, "battery", "SoH")
                .optional()
                .scaled_by("SoH_SF"),
            FieldDescriptor::new(1, ValueKind::ScaleFactor, "battery", "SoH_SF"),
        ];
        let b = block(&fields, &[0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(present(&fields[0], &b), DecodedValue::Undefined);
    }

    #[test]
    fn test_label_presentation() {
        let fields = vec![
            FieldDescriptor::new(0, ValueKind::UInt16, "info", "state").with_labels(&STATES),
        ];

        assert_eq!(
            present(&fields[0], &block(&fields, &[0x00, 0x06])),
            DecodedValue::Text("FeedIn".into())
        );
        assert_eq!(
            present(&fields[0], &block(&fields, &[0x00, 0x13])),
            DecodedValue::Text("Undefined".into())
        );
    }

    #[test]
    fn test_transform_applied_before_publish() {
        let fields = vec![
            FieldDescriptor::new(0, ValueKind::Float32, "battery", "temperature")
                .with_unit(Unit::Kelvin)
                .with_transform(CELSIUS_TO_KELVIN),
        ];
        let b = block(&fields, &25.0f32.to_bits().to_be_bytes());

        match present(&fields[0], &b) {
            DecodedValue::Decimal { value, unit } => {
                assert!((value - 298.15).abs() < 1e-9);
                assert_eq!(unit, Some(Unit::Kelvin));
            }
            other => panic!("Expected decimal, got {:?}", other),
        }
    }

    #[test]
    fn test_decoded_value_serialization() {
        let json = serde_json::to_string(&DecodedValue::decimal(230.5, Some(Unit::Volt))).unwrap();
        assert_eq!(json, r#"{"value":230.5,"unit":"V"}"#);

        let json = serde_json::to_string(&DecodedValue::Text("FeedIn".into())).unwrap();
        assert_eq!(json, r#""FeedIn""#);

        assert_eq!(serde_json::to_string(&DecodedValue::Undefined).unwrap(), "null");
    }
}
