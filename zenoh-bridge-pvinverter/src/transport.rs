//! Register reads over tokio-modbus.
//!
//! One [`ModbusReader`] per device owns a single connection. Reads from all
//! poll tasks of the device are serialized on it, and a failed transport drops
//! the connection so the next attempt reconnects.
//!
//! The connection is taken out of its slot for the duration of a request and
//! only put back once the device answered. A read future dropped mid-request
//! takes the connection with it, so a late reply can never be matched to the
//! next request.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use pvsight_modbus::{ExceptionCode, ReadError, ReadFunction, ReadRequest, RegisterReader};

use crate::config::{ConnectionConfig, DeviceConfig};

/// [`RegisterReader`] backed by a Modbus TCP or RTU client.
pub struct ModbusReader {
    device: String,
    connection: ConnectionConfig,
    unit_id: u8,
    timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl ModbusReader {
    /// Create a reader. The connection is opened on the first read.
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            device: device.name.clone(),
            connection: device.connection.clone(),
            unit_id: device.unit_id,
            timeout: Duration::from_millis(device.timeout_ms),
            context: Mutex::new(None),
        }
    }

    /// Connect to the Modbus device.
    async fn connect(&self) -> Result<Context, ReadError> {
        let slave = Slave(self.unit_id);

        match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = self.resolve(host, *port).await?;

                let ctx = tokio::time::timeout(self.timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| ReadError::Transport("Connection timeout".to_string()))?
                    .map_err(|e| ReadError::Transport(e.to_string()))?;

                info!(device = %self.device, %addr, "Connected to Modbus TCP device");
                Ok(ctx)
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(serial_parity(parity))
                    .stop_bits(serial_stop_bits(*stop_bits))
                    .data_bits(serial_data_bits(*data_bits))
                    .timeout(self.timeout);

                let serial = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| ReadError::Transport(format!("Serial open failed: {}", e)))?;

                info!(device = %self.device, port = %port, "Opened Modbus RTU port");
                Ok(rtu::attach_slave(serial, slave))
            }
        }
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, ReadError> {
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ReadError::Transport(format!("Invalid address: {}", e)))?
            .next()
            .ok_or_else(|| ReadError::Transport(format!("No address for host '{}'", host)))
    }

    /// A single attempt on an open connection.
    async fn read_once(ctx: &mut Context, request: &ReadRequest) -> Result<Vec<u16>, ReadError> {
        let key = request.key;
        let response = match key.function {
            ReadFunction::HoldingRegisters => ctx.read_holding_registers(key.start, key.count).await,
            ReadFunction::InputRegisters => ctx.read_input_registers(key.start, key.count).await,
        };

        response
            .map_err(|e| ReadError::Transport(e.to_string()))?
            .map_err(|e| ReadError::Exception(ExceptionCode::from_code(u8::from(e))))
    }
}

#[async_trait]
impl RegisterReader for ModbusReader {
    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError> {
        let mut guard = self.context.lock().await;
        let mut last_error = ReadError::Transport("No attempt made".to_string());

        for attempt in 1..=request.max_tries.max(1) {
            let mut ctx = match guard.take() {
                Some(ctx) => ctx,
                None => match self.connect().await {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        debug!(device = %self.device, attempt, error = %e, "Connect failed");
                        last_error = e;
                        continue;
                    }
                },
            };

            let result = tokio::time::timeout(self.timeout, Self::read_once(&mut ctx, request))
                .await
                .unwrap_or_else(|_| Err(ReadError::Transport("Response timeout".to_string())));

            match result {
                Ok(words) => {
                    *guard = Some(ctx);
                    return Ok(words.iter().flat_map(|w| w.to_be_bytes()).collect());
                }
                // The slave answered; asking again would get the same answer
                Err(e @ ReadError::Exception(_)) => {
                    *guard = Some(ctx);
                    return Err(e);
                }
                Err(e) => {
                    debug!(
                        device = %self.device,
                        range = %request.key,
                        attempt,
                        error = %e,
                        "Read attempt failed"
                    );
                    last_error = e;
                }
            }
        }

        warn!(
            device = %self.device,
            range = %request.key,
            tries = request.max_tries,
            error = %last_error,
            "Giving up on read"
        );
        Err(last_error)
    }
}

fn serial_parity(parity: &str) -> tokio_serial::Parity {
    match parity.to_lowercase().as_str() {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    }
}

fn serial_stop_bits(stop_bits: u8) -> tokio_serial::StopBits {
    match stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

fn serial_data_bits(data_bits: u8) -> tokio_serial::DataBits {
    match data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}
