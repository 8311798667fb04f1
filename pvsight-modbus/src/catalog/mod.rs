//! Device catalogs: the read-only register tables of each supported device family.
//!
//! A catalog is built once per device at startup and handed to the poll
//! manager. Building validates every range, so a broken table fails early.

pub mod kostal;
pub mod sunspec;

use serde::{Deserialize, Serialize};

use crate::decode::ByteOrder;
use crate::descriptor::{FieldDescriptor, FieldId};
use crate::error::ConstructionError;
use crate::identity::IdentityBlock;
use crate::range::{RangeKey, RegisterRange};

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceFamily {
    /// KOSTAL PLENTICORE hybrid inverter.
    KostalPlenticore,
    /// SunSpec battery base model (802).
    #[serde(rename = "sunspec_battery")]
    SunSpecBattery {
        #[serde(default = "default_sunspec_base")]
        base_address: u16,
    },
}

fn default_sunspec_base() -> u16 {
    sunspec::DEFAULT_BASE_ADDRESS
}

impl DeviceFamily {
    /// Word order used when the configuration does not say otherwise.
    pub fn default_byte_order(&self) -> ByteOrder {
        match self {
            DeviceFamily::KostalPlenticore => ByteOrder::LittleEndian,
            DeviceFamily::SunSpecBattery { .. } => ByteOrder::BigEndian,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::KostalPlenticore => "kostal_plenticore",
            DeviceFamily::SunSpecBattery { .. } => "sunspec_battery",
        }
    }

    /// Build and validate the catalog for this family.
    pub fn catalog(&self) -> Result<DeviceCatalog, ConstructionError> {
        let (ranges, identity) = match self {
            DeviceFamily::KostalPlenticore => (
                kostal::ranges()?,
                vec![IdentityBlock::ProductType, IdentityBlock::DeviceInfo],
            ),
            DeviceFamily::SunSpecBattery { base_address } => {
                (sunspec::ranges(*base_address)?, Vec::new())
            }
        };

        Ok(DeviceCatalog {
            family: *self,
            ranges,
            identity,
        })
    }
}

/// Validated register ranges of one device family.
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    family: DeviceFamily,
    ranges: Vec<RegisterRange>,
    identity: Vec<IdentityBlock>,
}

impl DeviceCatalog {
    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn ranges(&self) -> &[RegisterRange] {
        &self.ranges
    }

    pub fn range(&self, key: &RangeKey) -> Option<&RegisterRange> {
        self.ranges.iter().find(|r| r.key() == *key)
    }

    /// Ranges serving the given field. Usually one.
    pub fn ranges_for<'a>(&'a self, id: &'a FieldId) -> impl Iterator<Item = &'a RegisterRange> {
        self.ranges.iter().filter(move |r| r.contains(id))
    }

    /// Every descriptor of the catalog.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.ranges.iter().flat_map(|r| r.fields())
    }

    /// Information blocks read once at initialization.
    pub fn identity_blocks(&self) -> &[IdentityBlock] {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_serde() {
        let family: DeviceFamily = serde_json::from_str(r#"{"type": "kostal_plenticore"}"#).unwrap();
        assert_eq!(family, DeviceFamily::KostalPlenticore);

        let family: DeviceFamily = serde_json::from_str(r#"{"type": "sunspec_battery"}"#).unwrap();
        assert_eq!(
            family,
            DeviceFamily::SunSpecBattery {
                base_address: 40070
            }
        );

        let family: DeviceFamily =
            serde_json::from_str(r#"{"type": "sunspec_battery", "base_address": 40100}"#).unwrap();
        assert_eq!(family.as_str(), "sunspec_battery");
        assert_eq!(family.default_byte_order(), ByteOrder::BigEndian);
    }

    #[test]
    fn test_kostal_catalog() {
        let catalog = DeviceFamily::KostalPlenticore.catalog().unwrap();

        assert_eq!(catalog.ranges().len(), 7);
        assert_eq!(catalog.identity_blocks().len(), 2);

        let id = FieldId::new(kostal::CONSUMPTION, "total-dc-power");
        let serving: Vec<_> = catalog.ranges_for(&id).collect();
        assert_eq!(serving.len(), 1);
        assert_eq!(serving[0].start_address(), 100);

        assert!(catalog.range(&serving[0].key()).is_some());
        assert!(catalog.fields().count() > 40);
    }

    #[test]
    fn test_every_kostal_field_is_unique() {
        let catalog = DeviceFamily::KostalPlenticore.catalog().unwrap();
        let mut ids: Vec<&FieldId> = catalog.fields().map(|f| f.id()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
