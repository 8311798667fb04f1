use std::fmt;

use thiserror::Error;

use crate::descriptor::FieldId;
use crate::range::RangeKey;

/// Failure to turn raw register bytes into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Insufficient data: need {needed} bytes at offset {offset}, buffer has {available}")]
    InsufficientData {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Truncated buffer: block needs {required} bytes, got {available}")]
    TruncatedBuffer { required: usize, available: usize },

    #[error("Register {address} lies before block start {start}")]
    OutsideBlock { address: u16, start: u16 },

    #[error("Field '{field}' at register {address} is out of ascending address order")]
    Unordered { field: FieldId, address: u16 },
}

/// A static register table that cannot be turned into a read range.
///
/// These are programming errors in a descriptor table and are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("At least one register must be defined")]
    Empty,

    #[error("Register range at {start} spans {count} registers, more than {max}")]
    SpanTooLarge { start: u16, count: u32, max: u16 },

    #[error("Field '{field}' has zero register width")]
    ZeroWidth { field: FieldId },

    #[error("Field '{field}' at register {address} overlaps '{previous}'")]
    Overlap {
        field: FieldId,
        previous: FieldId,
        address: u16,
    },

    #[error("Field '{field}' references scale factor '{factor}' outside its range")]
    UnresolvedScaleFactor { field: FieldId, factor: FieldId },

    #[error("Model at base address {base} does not fit in the register address space")]
    AddressOverflow { base: u16 },
}

/// Invalid polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid poll interval: {0}ms")]
    InvalidPollInterval(u64),

    #[error("Invalid number of max tries: {0}")]
    InvalidMaxTries(u32),
}

/// Modbus exception code reported by the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetDevice,
    Other(u8),
}

impl ExceptionCode {
    /// Map a raw exception code from the wire.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            other => Self::Other(other),
        }
    }

    /// The raw exception code.
    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::ServerDeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetDevice => 0x0B,
            Self::Other(code) => *code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({:?})", self.code(), self)
    }
}

/// A read that did not produce a register buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Connection, timeout or framing failure below the protocol level.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The slave answered with a Modbus exception response.
    #[error("Slave exception {0}")]
    Exception(ExceptionCode),
}

/// A slave-reported condition that points at a register layout mismatch
/// rather than a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolSemanticError {
    #[error(
        "Illegal data access reading {range}: this inverter is not properly supported by the register layout"
    )]
    IllegalDataAccess { range: RangeKey },
}

impl ProtocolSemanticError {
    /// Classify a read error for the given range.
    pub fn classify(error: &ReadError, range: RangeKey) -> Option<Self> {
        match error {
            ReadError::Exception(ExceptionCode::IllegalDataAddress) => {
                Some(Self::IllegalDataAccess { range })
            }
            _ => None,
        }
    }
}

/// Common error type for the core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Protocol error: {0}")]
    ProtocolSemantic(#[from] ProtocolSemanticError),
}

/// Result type alias using the core's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
