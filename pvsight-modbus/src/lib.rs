//! PV inverter Modbus register decoding and poll lifecycle.
//!
//! This crate turns fixed-layout Modbus register blocks read from photovoltaic
//! inverters into typed, unit-tagged values, and decides which register ranges
//! are polled based on consumer interest:
//!
//! - [`descriptor`] - Field descriptors (`FieldDescriptor`, `ValueKind`, `FieldId`)
//! - [`decode`] - Scaled-value decoding, word order and "not implemented" sentinels
//! - [`block`] - Register block parsing into `ModelBlock`s
//! - [`value`] - Presentation of decoded fields as `DecodedValue`s
//! - [`range`] - Register ranges, the 125-register ceiling and range packing
//! - [`catalog`] - Register tables for KOSTAL PLENTICORE and SunSpec battery (model 802)
//! - [`identity`] - Device information blocks and properties
//! - [`poll`] - The poll lifecycle manager and its scheduler/consumer seams
//! - [`scheduler`] - Tokio task scheduler
//! - [`transport`] - The register reader seam
//! - [`error`] - Error types
//!
//! The Modbus transport itself is not part of this crate; hosts implement
//! [`RegisterReader`] on top of their client of choice.

pub mod block;
pub mod catalog;
pub mod decode;
pub mod descriptor;
pub mod error;
pub mod identity;
pub mod poll;
pub mod range;
pub mod scheduler;
pub mod transport;
pub mod value;

// Re-export commonly used types at the crate root
pub use block::{ModelBlock, parse_block};
pub use catalog::{DeviceCatalog, DeviceFamily};
pub use decode::{ByteOrder, FieldValue, decode_field};
pub use descriptor::{FieldDescriptor, FieldId, LabelTable, Presentation, Unit, ValueKind};
pub use error::{
    ConfigurationError, ConstructionError, DecodeError, Error, ExceptionCode,
    ProtocolSemanticError, ReadError, Result,
};
pub use identity::{DeviceProperties, IdentityBlock};
pub use poll::{
    DEFAULT_MAX_TRIES, DeviceStatus, InterestSource, PollConfig, PollManager, PollSettings,
    Scheduler, StatusDetail,
};
pub use range::{MAX_REGISTERS_PER_READ, RangeKey, ReadFunction, RegisterRange, pack_ranges};
pub use scheduler::{PollHandle, TaskScheduler};
pub use transport::{ReadCompletion, ReadPurpose, ReadRequest, RegisterReader};
pub use value::{DecodedValue, FieldUpdate};
