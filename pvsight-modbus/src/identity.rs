//! Kostal device information blocks and their decoding into device properties.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::block::parse_block;
use crate::decode::{ByteOrder, FieldValue};
use crate::descriptor::{FieldDescriptor, FieldId, ValueKind};
use crate::error::DecodeError;
use crate::range::{RangeKey, ReadFunction};

/// Informational key/value properties of a device.
pub type DeviceProperties = BTreeMap<String, String>;

pub const PRODUCT_NAME: &str = "productName";
pub const PRODUCT_CLASS: &str = "productClass";
pub const ARTICLE_NUMBER: &str = "articleNumber";
pub const SERIAL_NUMBER: &str = "serialNumber";
pub const HARDWARE_VERSION: &str = "hardwareVersion";
pub const SOFTWARE_VERSION_MC: &str = "softwareVersionMainController";
pub const SOFTWARE_VERSION_IOC: &str = "softwareVersionIoController";
pub const BIDIRECTIONAL_CONVERTERS: &str = "numberOfBidirectionalConverters";
pub const AC_PHASES: &str = "numberOfAcPhases";
pub const PV_STRINGS: &str = "numberOfPvStrings";
pub const BYTE_ORDER_WARNING: &str = "byteOrderWarning";

const GROUP: &str = "identity";
const BYTE_ORDER: &str = "byteOrder";

/// One-shot information reads issued when properties are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityBlock {
    /// Registers 5..56: byte order, article/serial numbers, versions.
    DeviceInfo,
    /// Registers 768..832: product name and power class.
    ProductType,
}

impl IdentityBlock {
    pub fn key(&self) -> RangeKey {
        match self {
            IdentityBlock::DeviceInfo => RangeKey::new(ReadFunction::HoldingRegisters, 5, 51),
            IdentityBlock::ProductType => RangeKey::new(ReadFunction::HoldingRegisters, 768, 64),
        }
    }

    /// Property whose presence means the block has already been read.
    pub fn gate_property(&self) -> &'static str {
        match self {
            IdentityBlock::DeviceInfo => SERIAL_NUMBER,
            IdentityBlock::ProductType => PRODUCT_NAME,
        }
    }

    /// Whether the block still needs to be read.
    pub fn is_missing(&self, properties: &DeviceProperties) -> bool {
        properties
            .get(self.gate_property())
            .is_none_or(|v| v.is_empty())
    }

    fn fields(&self) -> Vec<FieldDescriptor> {
        let text = |address, registers, name| {
            FieldDescriptor::new(address, ValueKind::Text { registers }, GROUP, name)
        };
        let number = |address, name| FieldDescriptor::new(address, ValueKind::UInt16, GROUP, name);

        match self {
            IdentityBlock::DeviceInfo => vec![
                number(5, BYTE_ORDER),
                text(6, 8, ARTICLE_NUMBER),
                text(14, 8, SERIAL_NUMBER),
                number(30, BIDIRECTIONAL_CONVERTERS),
                number(32, AC_PHASES),
                number(34, PV_STRINGS),
                number(36, HARDWARE_VERSION),
                text(38, 8, SOFTWARE_VERSION_MC),
                text(46, 8, SOFTWARE_VERSION_IOC),
            ],
            IdentityBlock::ProductType => vec![
                text(768, 32, PRODUCT_NAME),
                text(800, 32, PRODUCT_CLASS),
            ],
        }
    }

    /// Decode a raw read of this block.
    pub fn decode(&self, buffer: &[u8]) -> Result<DeviceIdentity, DecodeError> {
        let fields = self.fields();
        // Only single registers and strings here, so word order is irrelevant
        let block = parse_block(self.key().start, &fields, buffer, ByteOrder::BigEndian)?;

        let mut identity = DeviceIdentity::default();
        for (id, value) in block.iter() {
            let FieldId { name, .. } = id;
            match (name.as_str(), value) {
                (BYTE_ORDER, FieldValue::Integer(raw)) => {
                    identity.reported_byte_order = match *raw {
                        0 => Some(ByteOrder::LittleEndian),
                        1 => Some(ByteOrder::BigEndian),
                        _ => None,
                    };
                }
                (HARDWARE_VERSION, FieldValue::Integer(raw)) => {
                    identity
                        .properties
                        .insert(name.clone(), format_hardware_version(*raw as u16));
                }
                (_, FieldValue::Integer(raw)) => {
                    identity.properties.insert(name.clone(), raw.to_string());
                }
                (_, FieldValue::Text(text)) => {
                    identity.properties.insert(name.clone(), text.clone());
                }
                (_, _) => {}
            }
        }

        if let Some(product) = identity.properties.get(PRODUCT_NAME) {
            debug!(
                product = %product,
                class = identity.properties.get(PRODUCT_CLASS).map(String::as_str).unwrap_or(""),
                "Detected inverter"
            );
        }

        Ok(identity)
    }
}

/// Properties decoded from one identity block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceIdentity {
    pub properties: DeviceProperties,
    /// Word order the inverter says it uses, when the block carries it.
    pub reported_byte_order: Option<ByteOrder>,
}

impl DeviceIdentity {
    /// Compare the reported word order with the configured one.
    ///
    /// A mismatch is only reported, the configured order stays in effect.
    pub fn byte_order_warning(&self, configured: ByteOrder) -> Option<String> {
        let reported = self.reported_byte_order?;
        if reported == configured {
            return None;
        }

        warn!(
            reported = reported.as_str(),
            configured = configured.as_str(),
            "Byte order might be misconfigured"
        );
        Some(format!(
            "Inverter reports {}, configured {}",
            reported.as_str(),
            configured.as_str()
        ))
    }
}

/// Hardware version register rendered as hex, low byte first (`0x0601` is "0106").
pub fn format_hardware_version(raw: u16) -> String {
    let [high, low] = raw.to_be_bytes();
    format!("{:02X}{:02X}", low, high)
}
