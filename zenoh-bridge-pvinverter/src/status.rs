//! Bridge status reporting on `<prefix>/@/status`.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::Publisher;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Running,
    Offline,
}

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    pub status: BridgeState,
    /// Names of the configured devices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
}

impl BridgeStatus {
    pub const NAME: &'static str = "pvinverter";

    /// Create a new status with "running" state.
    pub fn running(devices: Vec<String>) -> Self {
        Self {
            bridge: Self::NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: BridgeState::Running,
            devices,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline() -> Self {
        Self {
            bridge: Self::NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: BridgeState::Offline,
            devices: Vec::new(),
        }
    }

    /// Publish this status to `{key_prefix}/@/status`.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let key = publisher.build_key("@/status");
        publisher.publish_json(&key, self).await
    }
}
