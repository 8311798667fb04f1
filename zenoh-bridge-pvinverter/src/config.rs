//! Configuration for the PV inverter bridge.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use pvsight_modbus::{ByteOrder, DEFAULT_MAX_TRIES, DeviceFamily, PollConfig};

use crate::interest::ChannelPattern;
use crate::publisher::Format;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Inverter-specific settings
    pub inverter: InverterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Inverter bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InverterConfig {
    /// Key expression prefix (default: "pvsight/inverter")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Payload encoding for published values
    #[serde(default)]
    pub serialization: Format,

    /// Devices to poll
    pub devices: Vec<DeviceConfig>,
}

fn default_key_prefix() -> String {
    "pvsight/inverter".to_string()
}

/// Configuration for a single inverter or battery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used in key expressions)
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Register table to use
    pub family: DeviceFamily,

    /// Poll interval in milliseconds. Required: missing or zero takes the
    /// device offline with a configuration error.
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Attempts per read before reporting a failure
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Low word first for 32-bit values; unset means the family default
    #[serde(default)]
    pub little_endian: Option<bool>,

    /// Connection and response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Channels to publish: `group#name`, `group#*` or `*`. Empty means all.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_max_tries() -> u32 {
    DEFAULT_MAX_TRIES
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Poll interval and retry bounds are checked per device by the poll
    /// manager, so a bad value takes one device offline instead of the bridge.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.zenoh.mode.as_str() {
            "client" | "peer" | "router" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "Invalid Zenoh mode '{}' (use client, peer, or router)",
                    other
                )));
            }
        }

        if self.inverter.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.inverter.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if device.name.contains(['/', '*', '$', '#', '?']) {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': name must not contain key expression characters",
                    device.name
                )));
            }

            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }

            if device.unit_id == 0 || device.unit_id > 247 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': unit_id must be 1-247",
                    device.name
                )));
            }

            if device.timeout_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': timeout_ms must be greater than 0",
                    device.name
                )));
            }

            if let ConnectionConfig::Rtu { parity, .. } = &device.connection {
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(ConfigError::Validation(format!(
                            "Device '{}': invalid parity '{}' (use none, even, or odd)",
                            device.name, parity
                        )));
                    }
                }
            }

            for channel in &device.channels {
                if ChannelPattern::parse(channel).is_none() {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': invalid channel '{}' (use group#name, group#* or *)",
                        device.name, channel
                    )));
                }
            }
        }

        Ok(())
    }
}

impl DeviceConfig {
    /// Word order for 32-bit values.
    pub fn byte_order(&self) -> ByteOrder {
        match self.little_endian {
            Some(true) => ByteOrder::LittleEndian,
            Some(false) => ByteOrder::BigEndian,
            None => self.family.default_byte_order(),
        }
    }

    /// Poll settings handed to the poll manager.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            poll_interval_ms: self.poll_interval_ms,
            max_tries: self.max_tries,
            byte_order: self.byte_order(),
        }
    }
}
