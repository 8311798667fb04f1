//! SunSpec model 802 (battery base model).

use crate::descriptor::{FieldDescriptor, Unit, ValueKind};
use crate::error::ConstructionError;
use crate::range::RegisterRange;

pub const GROUP: &str = "battery";

/// SunSpec model identifier.
pub const MODEL_ID: u16 = 802;

/// Length of the model block including the `ID` and `L` header registers.
pub const MODEL_LENGTH: u16 = 64;

/// Conventional start of the first model after the `SunS` marker and common model.
pub const DEFAULT_BASE_ADDRESS: u16 = 40070;

#[derive(Clone, Copy)]
enum Presence {
    Mandatory,
    Optional,
}

use Presence::{Mandatory as M, Optional as O};

struct Point {
    offset: u16,
    name: &'static str,
    kind: ValueKind,
    presence: Presence,
    unit: Option<Unit>,
    factor: Option<&'static str>,
}

const fn point(offset: u16, name: &'static str, kind: ValueKind, presence: Presence) -> Point {
    Point {
        offset,
        name,
        kind,
        presence,
        unit: None,
        factor: None,
    }
}

const fn scaled(
    offset: u16,
    name: &'static str,
    kind: ValueKind,
    presence: Presence,
    unit: Unit,
    factor: &'static str,
) -> Point {
    Point {
        offset,
        name,
        kind,
        presence,
        unit: Some(unit),
        factor: Some(factor),
    }
}

const U16: ValueKind = ValueKind::UInt16;
const I16: ValueKind = ValueKind::Int16;
const U32: ValueKind = ValueKind::UInt32;
const SF: ValueKind = ValueKind::ScaleFactor;

#[rustfmt::skip]
const POINTS: &[Point] = &[
    point(0, "ID", U16, M),
    point(1, "L", U16, M),
    scaled(2, "AHRtg", U16, M, Unit::AmpereHour, "AHRtg_SF"),
    scaled(3, "WHRtg", U16, M, Unit::WattHour, "WHRtg_SF"),
    scaled(4, "WChaRteMax", U16, M, Unit::Watt, "WChaDisChaMax_SF"),
    scaled(5, "WDisChaRteMax", U16, M, Unit::Watt, "WChaDisChaMax_SF"),
    scaled(6, "DisChaRte", U16, O, Unit::Percent, "DisChaRte_SF"),
    scaled(7, "SoCMax", U16, O, Unit::Percent, "SoC_SF"),
    scaled(8, "SoCMin", U16, O, Unit::Percent, "SoC_SF"),
    scaled(9, "SocRsvMax", U16, O, Unit::Percent, "SoC_SF"),
    scaled(10, "SoCRsvMin", U16, O, Unit::Percent, "SoC_SF"),
    scaled(11, "SoC", U16, M, Unit::Percent, "SoC_SF"),
    scaled(12, "DoD", U16, O, Unit::Percent, "DoD_SF"),
    scaled(13, "SoH", U16, O, Unit::Percent, "SoH_SF"),
    point(14, "NCyc", U32, O),
    point(16, "ChaSt", U16, O),
    point(17, "LocRemCtl", U16, M),
    point(18, "Hb", U16, O),
    point(19, "CtrlHb", U16, O),
    point(20, "AlmRst", U16, M),
    point(21, "Typ", U16, M),
    point(22, "State", U16, M),
    point(23, "StateVnd", U16, O),
    point(24, "WarrDt", U32, O),
    point(26, "Evt1", U32, M),
    point(28, "Evt2", U32, M),
    point(30, "EvtVnd1", U32, M),
    point(32, "EvtVnd2", U32, M),
    scaled(34, "V", U16, M, Unit::Volt, "V_SF"),
    scaled(35, "VMax", U16, O, Unit::Volt, "V_SF"),
    scaled(36, "VMin", U16, O, Unit::Volt, "V_SF"),
    scaled(37, "CellVMax", U16, O, Unit::Volt, "CellV_SF"),
    point(38, "CellVMaxStr", U16, O),
    point(39, "CellVMaxMod", U16, O),
    scaled(40, "CellVMin", U16, O, Unit::Volt, "CellV_SF"),
    point(41, "CellVMinStr", U16, O),
    point(42, "CellVMinMod", U16, O),
    scaled(43, "CellVAvg", U16, O, Unit::Volt, "CellV_SF"),
    scaled(44, "A", I16, M, Unit::Ampere, "A_SF"),
    scaled(45, "AChaMax", U16, O, Unit::Ampere, "AMax_SF"),
    scaled(46, "ADisChaMax", U16, O, Unit::Ampere, "AMax_SF"),
    scaled(47, "W", I16, M, Unit::Watt, "W_SF"),
    point(48, "ReqInvState", U16, O),
    scaled(49, "ReqW", I16, O, Unit::Watt, "W_SF"),
    point(50, "SetOp", U16, M),
    point(51, "SetInvState", U16, M),
    point(52, "AHRtg_SF", SF, M),
    point(53, "WHRtg_SF", SF, M),
    point(54, "WChaDisChaMax_SF", SF, M),
    point(55, "DisChaRte_SF", SF, O),
    point(56, "SoC_SF", SF, M),
    point(57, "DoD_SF", SF, O),
    point(58, "SoH_SF", SF, O),
    point(59, "V_SF", SF, M),
    point(60, "CellV_SF", SF, M),
    point(61, "A_SF", SF, M),
    point(62, "AMax_SF", SF, M),
    point(63, "W_SF", SF, O),
];

/// Build the single model 802 range starting at `base_address` (the `ID` register).
pub fn ranges(base_address: u16) -> Result<Vec<RegisterRange>, ConstructionError> {
    if base_address.checked_add(MODEL_LENGTH - 1).is_none() {
        return Err(ConstructionError::AddressOverflow { base: base_address });
    }

    let fields = POINTS.iter().map(|p| {
        let mut field = FieldDescriptor::new(base_address + p.offset, p.kind, GROUP, p.name);
        if let Presence::Optional = p.presence {
            field = field.optional();
        }
        if let Some(unit) = p.unit {
            field = field.with_unit(unit);
        }
        if let Some(factor) = p.factor {
            field = field.scaled_by(factor);
        }
        field
    });

    Ok(vec![RegisterRange::new(fields)?])
}
