//! Zenoh session for the bridge.

use zenoh::Session;

use crate::config::{BridgeConfig, ZenohConfig};
use crate::error::{Error, Result};

/// Translate the bridge's Zenoh settings. The mode was checked by
/// [`BridgeConfig::validate`].
pub fn zenoh_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    zenoh_config
        .insert_json5("mode", &format!("\"{}\"", config.mode))
        .map_err(|e| Error::Config(format!("Failed to set mode '{}': {}", config.mode, e)))?;

    for (key, endpoints) in [
        ("connect/endpoints", &config.connect),
        ("listen/endpoints", &config.listen),
    ] {
        if endpoints.is_empty() {
            continue;
        }
        zenoh_config
            .insert_json5(key, &serde_json::to_string(endpoints)?)
            .map_err(|e| Error::Config(format!("Failed to set {}: {}", key, e)))?;
    }

    Ok(zenoh_config)
}

/// Open the session every device worker and command listener shares.
pub async fn open(config: &BridgeConfig) -> Result<Session> {
    let zenoh_config = zenoh_config(&config.zenoh)?;

    tracing::info!(
        mode = %config.zenoh.mode,
        connect = ?config.zenoh.connect,
        listen = ?config.zenoh.listen,
        key_prefix = %config.inverter.key_prefix,
        devices = config.inverter.devices.len(),
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;
    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}
