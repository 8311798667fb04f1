//! Zenoh bridge for PV inverters.
//!
//! Polls KOSTAL PLENTICORE inverters and SunSpec batteries over Modbus
//! (TCP or RTU) and publishes decoded values to Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use zenoh_bridge_pvinverter::config::{BridgeConfig, LoggingConfig};
use zenoh_bridge_pvinverter::publisher::Publisher;
use zenoh_bridge_pvinverter::status::BridgeStatus;
use zenoh_bridge_pvinverter::transport::ModbusReader;
use zenoh_bridge_pvinverter::{command, session, worker};

/// Zenoh bridge for PV inverters (Modbus TCP/RTU).
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-pvinverter")]
#[command(about = "Polls PV inverters over Modbus and publishes to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "pvinverter.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    zenoh_bridge_pvinverter::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-pvinverter");
    info!("Loaded configuration from {:?}", args.config);

    let session = session::open(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?;

    let publisher = Publisher::new(
        session.clone(),
        config.inverter.key_prefix.clone(),
        config.inverter.serialization,
    );
    let sink = Arc::new(publisher.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    for device in &config.inverter.devices {
        info!(
            "Starting worker for device '{}' ({}, {:?})",
            device.name,
            device.family.as_str(),
            device.connection
        );

        let (commands_tx, commands_rx) = mpsc::channel(command::COMMAND_QUEUE_DEPTH);
        let command_key = publisher.build_key(&format!("{}/@/command", device.name));
        let listener_shutdown = shutdown_rx.clone();
        let listener_session = session.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) =
                command::listen(listener_session, command_key, commands_tx, listener_shutdown).await
            {
                error!("Command listener error: {}", e);
            }
        }));

        let name = device.name.clone();
        let reader = Arc::new(ModbusReader::new(device));
        let worker = worker::run(
            device.clone(),
            reader,
            Arc::clone(&sink),
            commands_rx,
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = worker.await {
                error!("Device '{}': worker failed: {}", name, e);
            }
        }));
    }

    info!(
        "PV inverter bridge running with {} device(s)",
        config.inverter.devices.len()
    );

    let devices = config
        .inverter
        .devices
        .iter()
        .map(|d| d.name.clone())
        .collect();
    if let Err(e) = BridgeStatus::running(devices).publish(&publisher).await {
        error!("Failed to publish bridge status: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    shutdown_tx.send(true)?;
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            error!("Task did not stop in time");
        }
    }

    let _ = BridgeStatus::offline().publish(&publisher).await;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("PV inverter bridge stopped");

    Ok(())
}
