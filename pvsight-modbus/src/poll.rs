//! Poll lifecycle management.
//!
//! The [`PollManager`] owns the active-poll table of one device. It decides
//! which register ranges are polled based on consumer interest, asks a
//! [`Scheduler`] to start or stop periodic reads, and turns read completions
//! into field updates. It is driven from a single control path; completions
//! are handed to it one at a time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::catalog::DeviceCatalog;
use crate::decode::ByteOrder;
use crate::descriptor::FieldId;
use crate::error::{ConfigurationError, ProtocolSemanticError};
use crate::identity::{BYTE_ORDER_WARNING, DeviceProperties, IdentityBlock};
use crate::range::{RangeKey, RegisterRange};
use crate::transport::{ReadCompletion, ReadPurpose, ReadRequest};
use crate::value::FieldUpdate;

/// Default number of read attempts per request.
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Identity blocks are read once, without retries.
const IDENTITY_MAX_TRIES: u8 = 1;

/// Scheduling seam for recurring and one-shot reads.
pub trait Scheduler {
    /// Token identifying one periodic read.
    type Handle;

    /// Start reading `request` every `interval`, first read immediately.
    fn schedule_periodic(&mut self, request: ReadRequest, interval: Duration) -> Self::Handle;

    /// Stop a periodic read.
    fn cancel(&mut self, handle: Self::Handle);

    /// Issue a single read.
    fn submit_once(&mut self, request: ReadRequest);
}

/// Consumer seam: whether anybody wants a field's values.
pub trait InterestSource {
    fn is_interested(&self, field: &FieldId) -> bool;
}

impl<F> InterestSource for F
where
    F: Fn(&FieldId) -> bool,
{
    fn is_interested(&self, field: &FieldId) -> bool {
        self(field)
    }
}

/// Raw polling configuration, as supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval_ms: u64,
    pub max_tries: u32,
    pub byte_order: ByteOrder,
}

impl PollConfig {
    /// Check the configuration and turn it into usable settings.
    pub fn validate(&self) -> Result<PollSettings, ConfigurationError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::InvalidPollInterval(self.poll_interval_ms));
        }

        let max_tries = u8::try_from(self.max_tries)
            .ok()
            .filter(|tries| *tries > 0)
            .ok_or(ConfigurationError::InvalidMaxTries(self.max_tries))?;

        Ok(PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_tries,
            byte_order: self.byte_order,
        })
    }
}

/// Validated polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_tries: u8,
    pub byte_order: ByteOrder,
}

/// Why a device is offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusDetail {
    ConfigurationError(String),
    CommunicationError(String),
}

/// Operational status of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline(StatusDetail),
}

impl DeviceStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, DeviceStatus::Online)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Unknown => f.write_str("unknown"),
            DeviceStatus::Online => f.write_str("online"),
            DeviceStatus::Offline(StatusDetail::ConfigurationError(msg)) => {
                write!(f, "offline (configuration error: {})", msg)
            }
            DeviceStatus::Offline(StatusDetail::CommunicationError(msg)) => {
                write!(f, "offline (communication error: {})", msg)
            }
        }
    }
}

/// Per-device poll lifecycle manager.
pub struct PollManager<S: Scheduler> {
    catalog: DeviceCatalog,
    scheduler: S,
    settings: Option<PollSettings>,
    active: HashMap<RangeKey, S::Handle>,
    refreshing: HashSet<RangeKey>,
    status: DeviceStatus,
    properties: DeviceProperties,
}

impl<S: Scheduler> PollManager<S> {
    pub fn new(catalog: DeviceCatalog, scheduler: S) -> Self {
        Self {
            catalog,
            scheduler,
            settings: None,
            active: HashMap::new(),
            refreshing: HashSet::new(),
            status: DeviceStatus::Unknown,
            properties: DeviceProperties::new(),
        }
    }

    /// Start with previously known device properties; identity blocks whose
    /// gate property is present are not read again.
    pub fn with_properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Validate the configuration, request missing identity blocks and
    /// activate every range some consumer is interested in.
    ///
    /// Invalid configuration leaves the device offline with a configuration
    /// error and nothing scheduled.
    pub fn initialize<I>(&mut self, config: PollConfig, interest: &I) -> Result<(), ConfigurationError>
    where
        I: InterestSource + ?Sized,
    {
        let settings = match config.validate() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Invalid poll configuration");
                self.status = DeviceStatus::Offline(StatusDetail::ConfigurationError(e.to_string()));
                return Err(e);
            }
        };

        self.settings = Some(settings);
        self.status = DeviceStatus::Unknown;

        for block in self.catalog.identity_blocks().to_vec() {
            if block.is_missing(&self.properties) {
                debug!(range = %block.key(), "Requesting device information");
                self.scheduler.submit_once(ReadRequest {
                    key: block.key(),
                    max_tries: IDENTITY_MAX_TRIES,
                    purpose: ReadPurpose::Identity(block),
                });
            }
        }

        let keys: Vec<RangeKey> = self.catalog.ranges().iter().map(RegisterRange::key).collect();
        for key in keys {
            self.update_poll(key, interest);
        }

        info!(
            family = self.catalog.family().as_str(),
            ranges = self.catalog.ranges().len(),
            active = self.active.len(),
            "Poll manager initialized"
        );
        Ok(())
    }

    /// React to a consumer starting or stopping interest in a field.
    pub fn interest_changed<I>(&mut self, field: &FieldId, interest: &I)
    where
        I: InterestSource + ?Sized,
    {
        if self.settings.is_none() {
            debug!(field = %field, "Ignoring interest change before initialization");
            return;
        }

        let keys: Vec<RangeKey> = self.catalog.ranges_for(field).map(RegisterRange::key).collect();
        if keys.is_empty() {
            debug!(field = %field, "Unknown field");
            return;
        }

        for key in keys {
            self.update_poll(key, interest);
        }
    }

    /// Issue a one-shot read of every range serving `field`.
    ///
    /// A range with a refresh still pending is not read again. A refresh does
    /// not wait for the range's periodic read; the transport serializes the two.
    /// Returns false for unknown fields or before initialization.
    pub fn refresh(&mut self, field: &FieldId) -> bool {
        let Some(settings) = self.settings else {
            return false;
        };

        let requests: Vec<ReadRequest> = self
            .catalog
            .ranges_for(field)
            .map(|range| range.read_request(settings.max_tries, ReadPurpose::Refresh))
            .collect();

        if requests.is_empty() {
            debug!(field = %field, "Unknown field");
            return false;
        }

        for request in requests {
            if !self.refreshing.insert(request.key) {
                trace!(range = %request.key, "Refresh already pending");
                continue;
            }
            trace!(range = %request.key, "Refresh requested");
            self.scheduler.submit_once(request);
        }
        true
    }

    /// Process the outcome of a read and return the updates to publish.
    ///
    /// Failures never change which ranges are active.
    pub fn complete(&mut self, completion: ReadCompletion) -> Vec<FieldUpdate> {
        let ReadCompletion { request, result } = completion;
        if request.purpose == ReadPurpose::Refresh {
            self.refreshing.remove(&request.key);
        }

        let buffer = match result {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(range = %request.key, error = %e, "Failed to read registers");
                if let Some(semantic) = ProtocolSemanticError::classify(&e, request.key) {
                    warn!(error = %semantic, "Inverter rejected register layout");
                }
                self.status = DeviceStatus::Offline(StatusDetail::CommunicationError(format!(
                    "Failed to retrieve data: {}",
                    e
                )));
                return Vec::new();
            }
        };

        let byte_order = self.byte_order();

        match request.purpose {
            ReadPurpose::Identity(block) => {
                self.complete_identity(block, &buffer, byte_order);
                Vec::new()
            }
            ReadPurpose::Poll | ReadPurpose::Refresh => {
                let Some(range) = self.catalog.range(&request.key) else {
                    warn!(range = %request.key, "Completion for unknown range");
                    return Vec::new();
                };

                match range.decode_updates(&buffer, byte_order) {
                    Ok(updates) => {
                        self.mark_online();
                        updates
                    }
                    Err(e) => {
                        warn!(range = %request.key, error = %e, "Failed to decode registers");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Cancel every periodic read. Returns how many were cancelled.
    pub fn shutdown(&mut self) -> usize {
        let count = self.active.len();
        for (key, handle) in self.active.drain() {
            debug!(range = %key, "Cancelling poll");
            self.scheduler.cancel(handle);
        }
        count
    }

    pub fn is_active(&self, key: &RangeKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    fn byte_order(&self) -> ByteOrder {
        self.settings
            .map(|s| s.byte_order)
            .unwrap_or_else(|| self.catalog.family().default_byte_order())
    }

    fn mark_online(&mut self) {
        if !self.status.is_online() {
            info!("Device online");
            self.status = DeviceStatus::Online;
        }
    }

    fn update_poll<I>(&mut self, key: RangeKey, interest: &I)
    where
        I: InterestSource + ?Sized,
    {
        let Some(settings) = self.settings else {
            return;
        };
        let Some(range) = self.catalog.range(&key) else {
            return;
        };

        let wanted = range.fields().iter().any(|f| interest.is_interested(f.id()));

        if wanted {
            if !self.active.contains_key(&key) {
                debug!(range = %key, interval = ?settings.interval, "Activating poll");
                let request = range.read_request(settings.max_tries, ReadPurpose::Poll);
                let handle = self.scheduler.schedule_periodic(request, settings.interval);
                self.active.insert(key, handle);
            }
        } else if let Some(handle) = self.active.remove(&key) {
            debug!(range = %key, "Deactivating poll");
            self.scheduler.cancel(handle);
        }
    }

    fn complete_identity(&mut self, block: IdentityBlock, buffer: &[u8], byte_order: ByteOrder) {
        match block.decode(buffer) {
            Ok(identity) => {
                self.mark_online();
                if let Some(warning) = identity.byte_order_warning(byte_order) {
                    self.properties.insert(BYTE_ORDER_WARNING.to_string(), warning);
                }
                self.properties.extend(identity.properties);
            }
            Err(e) => {
                warn!(range = %block.key(), error = %e, "Failed to decode device information");
            }
        }
    }
}
