//! Zenoh bridge for PV inverters and batteries over Modbus.
//!
//! Each configured device gets a [`worker`] driving a
//! [`PollManager`](pvsight_modbus::PollManager) over a [`transport::ModbusReader`].
//! Decoded values of linked channels are published to Zenoh by the
//! [`publisher`]. Channels can be linked, unlinked and refreshed at runtime
//! through the [`command`] key.

pub mod command;
pub mod config;
pub mod error;
pub mod interest;
pub mod publisher;
pub mod session;
pub mod status;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};

use config::{LogFormat, LoggingConfig};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
