//! Telemetry payloads and their publication to Zenoh.
//!
//! Key layout under the configured prefix:
//!
//! - `<prefix>/<device>/<group>/<name>` - decoded values
//! - `<prefix>/<device>/@/properties` - device information (JSON)
//! - `<prefix>/<device>/@/status` - device status (JSON)

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use pvsight_modbus::{
    DecodedValue, DeviceFamily, DeviceProperties, DeviceStatus, FieldDescriptor, FieldUpdate,
};

use crate::error::{Error, Result};

/// Serialization format for telemetry data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Value carried by a telemetry point. `Undefined` serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Gauge(f64),
    Text(String),
    Undefined,
}

/// A single published value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Unix epoch milliseconds when the value was decoded.
    pub timestamp: i64,

    /// Device name.
    pub source: String,

    /// `group/name` of the channel.
    pub metric: String,

    pub value: TelemetryValue,

    /// `unit` and `register` when known.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl TelemetryPoint {
    /// Build a point from a decoded update. The descriptor, when given,
    /// contributes the start register label.
    pub fn from_update(
        source: impl Into<String>,
        update: &FieldUpdate,
        descriptor: Option<&FieldDescriptor>,
    ) -> Self {
        let mut labels = BTreeMap::new();

        let value = match &update.value {
            DecodedValue::Decimal { value, unit } => {
                if let Some(unit) = unit {
                    labels.insert("unit".to_string(), unit.symbol().to_string());
                }
                TelemetryValue::Gauge(*value)
            }
            DecodedValue::Text(text) => TelemetryValue::Text(text.clone()),
            DecodedValue::Undefined => TelemetryValue::Undefined,
        };

        if let Some(descriptor) = descriptor {
            labels.insert("register".to_string(), descriptor.address().to_string());
        }

        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            source: source.into(),
            metric: format!("{}/{}", update.field.group, update.field.name),
            value,
            labels,
        }
    }
}

/// Device status as published on `<prefix>/<device>/@/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusReport {
    pub device: String,
    pub family: DeviceFamily,
    pub timestamp: i64,
    #[serde(flatten)]
    pub status: DeviceStatus,
}

impl DeviceStatusReport {
    pub fn new(device: impl Into<String>, family: DeviceFamily, status: DeviceStatus) -> Self {
        Self {
            device: device.into(),
            family,
            timestamp: chrono::Utc::now().timestamp_millis(),
            status,
        }
    }
}

/// Where the device workers send what they produce.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish_point(&self, point: &TelemetryPoint) -> Result<()>;

    async fn publish_properties(&self, device: &str, properties: &DeviceProperties) -> Result<()>;

    async fn publish_status(&self, report: &DeviceStatusReport) -> Result<()>;
}

/// Publishes to a Zenoh session.
#[derive(Clone)]
pub struct Publisher {
    session: zenoh::Session,
    key_prefix: String,
    format: Format,
}

impl Publisher {
    pub fn new(session: zenoh::Session, key_prefix: impl Into<String>, format: Format) -> Self {
        Self {
            session,
            key_prefix: key_prefix.into(),
            format,
        }
    }

    /// Build a full key expression from a suffix.
    pub fn build_key(&self, suffix: &str) -> String {
        build_key(&self.key_prefix, suffix)
    }

    /// Publish a JSON value to a key.
    pub async fn publish_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.session.put(key, payload).await?;
        Ok(())
    }
}

/// Join a key prefix and a suffix.
pub fn build_key(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, suffix)
    }
}

#[async_trait]
impl TelemetrySink for Publisher {
    async fn publish_point(&self, point: &TelemetryPoint) -> Result<()> {
        let key = self.build_key(&format!("{}/{}", point.source, point.metric));
        let payload = encode(point, self.format)?;

        trace!(key = %key, "Publishing value");
        self.session.put(&key, payload).await?;
        Ok(())
    }

    async fn publish_properties(&self, device: &str, properties: &DeviceProperties) -> Result<()> {
        let key = self.build_key(&format!("{}/@/properties", device));
        self.publish_json(&key, properties).await
    }

    async fn publish_status(&self, report: &DeviceStatusReport) -> Result<()> {
        let key = self.build_key(&format!("{}/@/status", report.device));
        self.publish_json(&key, report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvsight_modbus::{FieldId, StatusDetail, Unit, ValueKind};

    fn power_update() -> FieldUpdate {
        FieldUpdate {
            field: FieldId::new("consumption", "total-dc-power"),
            value: DecodedValue::decimal(4321.5, Some(Unit::Watt)),
        }
    }

    #[test]
    fn test_point_from_decimal_update() {
        let descriptor =
            FieldDescriptor::new(100, ValueKind::Float32, "consumption", "total-dc-power")
                .with_unit(Unit::Watt);
        let point = TelemetryPoint::from_update("plenticore", &power_update(), Some(&descriptor));

        assert_eq!(point.source, "plenticore");
        assert_eq!(point.metric, "consumption/total-dc-power");
        assert_eq!(point.value, TelemetryValue::Gauge(4321.5));
        assert_eq!(point.labels["unit"], "W");
        assert_eq!(point.labels["register"], "100");
        assert!(point.timestamp > 0);
    }

    #[test]
    fn test_point_json_shape() {
        let update = FieldUpdate {
            field: FieldId::new("battery", "SoH"),
            value: DecodedValue::Undefined,
        };
        let point = TelemetryPoint::from_update("battery", &update, None);

        let json: serde_json::Value = serde_json::from_slice(&encode(&point, Format::Json).unwrap()).unwrap();
        assert_eq!(json["source"], "battery");
        assert_eq!(json["metric"], "battery/SoH");
        assert!(json["value"].is_null());
        assert!(json.get("labels").is_none());

        let state = FieldUpdate {
            field: FieldId::new("device-information", "inverter-state"),
            value: DecodedValue::Text("FeedIn".into()),
        };
        let point = TelemetryPoint::from_update("plenticore", &state, None);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["value"], "FeedIn");
    }

    #[test]
    fn test_cbor_payload_decodes() {
        let point = TelemetryPoint::from_update("plenticore", &power_update(), None);

        let encoded = encode(&point, Format::Cbor).unwrap();
        let decoded: TelemetryPoint = ciborium::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn test_status_report_json() {
        let report = DeviceStatusReport::new(
            "plenticore",
            DeviceFamily::KostalPlenticore,
            DeviceStatus::Offline(StatusDetail::CommunicationError(
                "Failed to retrieve data: Transport error: Connection timeout".into(),
            )),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["device"], "plenticore");
        assert_eq!(json["family"]["type"], "kostal_plenticore");
        assert_eq!(json["status"], "offline");
        assert!(
            json["detail"]["communication_error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to retrieve data")
        );

        let online = DeviceStatusReport::new(
            "plenticore",
            DeviceFamily::KostalPlenticore,
            DeviceStatus::Online,
        );
        let json = serde_json::to_value(&online).unwrap();
        assert_eq!(json["status"], "online");
    }

    #[test]
    fn test_build_key() {
        assert_eq!(build_key("pvsight/inverter", ""), "pvsight/inverter");
        assert_eq!(
            build_key("pvsight/inverter", "plenticore/@/status"),
            "pvsight/inverter/plenticore/@/status"
        );
    }
}
