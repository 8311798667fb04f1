//! KOSTAL PLENTICORE register layout.
//!
//! Holding registers, function code 0x03. Multi-register values are
//! little-endian word order unless the inverter has been reconfigured.

use crate::descriptor::{CELSIUS_TO_KELVIN, FieldDescriptor, LabelTable, Unit, ValueKind};
use crate::error::ConstructionError;
use crate::range::RegisterRange;

pub const DEVICE_INFORMATION: &str = "device-information";
pub const CONSUMPTION: &str = "consumption";
pub const GRID_INFORMATION: &str = "grid-information";
pub const BATTERY_INFORMATION: &str = "battery-information";
pub const STATISTICS: &str = "statistics";
pub const STRING_INFORMATION: &str = "string-information";

/// Inverter state register (56).
pub static INVERTER_STATES: LabelTable = LabelTable::new(
    &[
        (0, "Off"),
        (1, "Init"),
        (2, "IsoMeas"),
        (3, "GridCheck"),
        (4, "StartUp"),
        (5, "-"),
        (6, "FeedIn"),
        (7, "Throttled"),
        (8, "ExtSwitchOff"),
        (9, "Update"),
        (10, "Standby"),
        (11, "GridSync"),
        (12, "GridPreCheck"),
        (13, "GridSwitchOff"),
        (14, "Overheating"),
        (15, "Shutdown"),
        (16, "ImproperDcVoltage"),
        (17, "ESB"),
        (18, "Unknown"),
    ],
    "Undefined",
);

/// Energy manager state register (104), a bit field of which only single bits are mapped.
pub static ENERGY_MANAGER_STATES: LabelTable = LabelTable::new(
    &[
        (0x00, "Idle"),
        (0x01, "n/a"),
        (0x02, "Emergency Battery Charge"),
        (0x04, "n/a"),
        (0x08, "Winter Mode Step 1"),
        (0x10, "Winter Mode Step 2"),
    ],
    "Unknown",
);

fn float(address: u16, group: &str, name: &str, unit: Unit) -> FieldDescriptor {
    FieldDescriptor::new(address, ValueKind::Float32, group, name).with_unit(unit)
}

fn state(address: u16, name: &str, labels: &'static LabelTable) -> [FieldDescriptor; 2] {
    [
        FieldDescriptor::new(address, ValueKind::UInt32, DEVICE_INFORMATION, name)
            .with_labels(labels),
        FieldDescriptor::new(
            address,
            ValueKind::UInt32,
            DEVICE_INFORMATION,
            format!("{name}-raw"),
        ),
    ]
}

/// Build the PLENTICORE read ranges.
pub fn ranges() -> Result<Vec<RegisterRange>, ConstructionError> {
    use Unit::*;

    let inverter_state = RegisterRange::new(state(56, "inverter-state", &INVERTER_STATES))?;

    // 98..126
    let mut consumption = vec![float(100, CONSUMPTION, "total-dc-power", Watt)];
    consumption.extend(state(
        104,
        "state-of-energy-manager",
        &ENERGY_MANAGER_STATES,
    ));
    consumption.extend([
        float(106, CONSUMPTION, "home-own-consumption-from-battery", Watt),
        float(108, CONSUMPTION, "home-own-consumption-from-grid", Watt),
        float(110, CONSUMPTION, "total-home-consumption-battery", WattHour),
        float(112, CONSUMPTION, "total-home-consumption-grid", WattHour),
        float(114, CONSUMPTION, "total-home-consumption-pv", WattHour),
        float(116, CONSUMPTION, "home-own-consumption-pv", Watt),
        float(118, CONSUMPTION, "total-home-consumption", WattHour),
        float(124, CONSUMPTION, "total-home-consumption-rate", Percent),
    ]);
    let consumption = RegisterRange::new(consumption)?;

    let grid = RegisterRange::new([
        float(172, GRID_INFORMATION, "total-ac-active-power", Watt),
        float(174, GRID_INFORMATION, "total-ac-reactive-power", Var),
        float(178, GRID_INFORMATION, "total-ac-apparent-power", VoltAmpere),
    ])?;

    let battery = RegisterRange::new([
        float(190, BATTERY_INFORMATION, "battery-charge-current", Ampere),
        FieldDescriptor::new(
            194,
            ValueKind::Float32,
            BATTERY_INFORMATION,
            "number-of-battery-cycles",
        ),
        float(
            200,
            BATTERY_INFORMATION,
            "actual-battery-charge-discharge-current",
            Ampere,
        ),
        float(210, BATTERY_INFORMATION, "actual-state-of-charge", Percent),
        float(214, BATTERY_INFORMATION, "battery-temperature", Kelvin)
            .with_transform(CELSIUS_TO_KELVIN),
        float(216, BATTERY_INFORMATION, "battery-voltage", Volt),
    ])?;

    let statistics = RegisterRange::new([
        float(320, STATISTICS, "total-yield", WattHour),
        float(322, STATISTICS, "daily-yield", WattHour),
        float(324, STATISTICS, "yearly-yield", WattHour),
        float(326, STATISTICS, "monthly-yield", WattHour),
    ])?;

    let battery_info = RegisterRange::new([
        FieldDescriptor::new(
            512,
            ValueKind::UInt32,
            BATTERY_INFORMATION,
            "battery-gross-capacity",
        )
        .with_unit(AmpereHour),
        FieldDescriptor::new(514, ValueKind::UInt16, BATTERY_INFORMATION, "battery-actual-soc")
            .with_unit(Percent),
        FieldDescriptor::new(529, ValueKind::UInt32, BATTERY_INFORMATION, "work-capacity")
            .with_unit(WattHour),
    ])?;

    let energy_flow = RegisterRange::new([
        float(
            1038,
            BATTERY_INFORMATION,
            "battery-max-charge-power-limit",
            Watt,
        ),
        float(
            1040,
            BATTERY_INFORMATION,
            "battery-max-discharge-power-limit",
            Watt,
        ),
        float(1042, BATTERY_INFORMATION, "minimum-soc", Percent),
        float(1044, BATTERY_INFORMATION, "maximum-soc", Percent),
        float(1046, BATTERY_INFORMATION, "total-dc-to-battery", WattHour),
        float(1048, BATTERY_INFORMATION, "total-dc-from-battery", WattHour),
        float(1050, BATTERY_INFORMATION, "total-ac-to-battery", WattHour),
        float(1052, BATTERY_INFORMATION, "total-battery-to-grid", WattHour),
        float(1054, BATTERY_INFORMATION, "total-grid-to-battery", WattHour),
        float(1056, STRING_INFORMATION, "total-dc-pv-energy", WattHour),
        float(1058, STRING_INFORMATION, "total-dc-energy-pv1", WattHour),
        float(1060, STRING_INFORMATION, "total-dc-energy-pv2", WattHour),
        float(1062, STRING_INFORMATION, "total-dc-energy-pv3", WattHour),
        float(1064, CONSUMPTION, "total-ac-to-grid", WattHour),
        float(1066, STRING_INFORMATION, "total-dc-power-pv", Watt),
        float(1068, BATTERY_INFORMATION, "battery-work-capacity", WattHour),
    ])?;

    Ok(vec![
        inverter_state,
        consumption,
        grid,
        battery,
        statistics,
        battery_info,
        energy_flow,
    ])
}
