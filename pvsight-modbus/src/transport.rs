//! Transport seam: how the core asks a host for register bytes.

use async_trait::async_trait;

use crate::error::ReadError;
use crate::identity::IdentityBlock;
use crate::range::RangeKey;

/// Why a read was issued. Carried back with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadPurpose {
    /// Recurring read of an Active range.
    Poll,
    /// One-shot read requested by a consumer.
    Refresh,
    /// One-shot read of a device information block.
    Identity(IdentityBlock),
}

/// A single read of one register range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: RangeKey,
    /// Attempts the transport may make before reporting failure.
    pub max_tries: u8,
    pub purpose: ReadPurpose,
}

/// Outcome of a [`ReadRequest`], routed back to the poll manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCompletion {
    pub request: ReadRequest,
    /// Raw register bytes, two per register, in wire order.
    pub result: Result<Vec<u8>, ReadError>,
}

impl ReadCompletion {
    pub fn new(request: ReadRequest, result: Result<Vec<u8>, ReadError>) -> Self {
        Self { request, result }
    }
}

/// Something that can read registers from a device.
///
/// Implementations own the connection and are responsible for retrying a
/// failed request up to [`ReadRequest::max_tries`] times.
#[async_trait]
pub trait RegisterReader: Send + Sync {
    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError>;
}
