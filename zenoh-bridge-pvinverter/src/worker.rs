//! Per-device worker: owns one poll manager and publishes what it produces.
//!
//! The worker is the single owner of the manager. Read completions, commands
//! and the shutdown signal are all handled on its loop, one at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use pvsight_modbus::{
    DeviceProperties, DeviceStatus, FieldDescriptor, FieldId, FieldUpdate, InterestSource,
    PollManager, RangeKey, RegisterReader, TaskScheduler,
};

use crate::command::DeviceCommand;
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::interest::{ChannelInterest, ChannelPattern};
use crate::publisher::{DeviceStatusReport, TelemetryPoint, TelemetrySink};

struct Worker<R: RegisterReader + ?Sized + 'static, K: TelemetrySink + ?Sized> {
    device: DeviceConfig,
    manager: PollManager<TaskScheduler<R>>,
    interest: ChannelInterest,
    descriptors: HashMap<FieldId, FieldDescriptor>,
    sink: Arc<K>,
    published_status: Option<DeviceStatus>,
    published_properties: DeviceProperties,
}

/// Poll one device until `shutdown` turns true.
///
/// A register table that fails to build is returned as an error. An invalid
/// poll configuration only takes this device offline: its status is published
/// and the worker idles until shutdown, discarding any command it receives.
pub async fn run<R, K>(
    device: DeviceConfig,
    reader: Arc<R>,
    sink: Arc<K>,
    mut commands: mpsc::Receiver<DeviceCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: RegisterReader + ?Sized + 'static,
    K: TelemetrySink + ?Sized,
{
    let catalog = device.family.catalog()?;
    let descriptors = catalog
        .fields()
        .map(|f| (f.id().clone(), f.clone()))
        .collect();

    let (scheduler, mut completions) = TaskScheduler::new(reader);
    let mut worker = Worker {
        interest: ChannelInterest::from_config(&device.channels),
        manager: PollManager::new(catalog, scheduler),
        device,
        descriptors,
        sink,
        published_status: None,
        published_properties: DeviceProperties::new(),
    };

    let configured = worker
        .manager
        .initialize(worker.device.poll_config(), &worker.interest)
        .is_ok();
    worker.publish_status().await;

    if !configured {
        error!(
            device = %worker.device.name,
            status = %worker.manager.status(),
            "Device not polled"
        );
    } else {
        info!(
            device = %worker.device.name,
            family = worker.device.family.as_str(),
            active = worker.manager.active_count(),
            "Device worker started"
        );
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            Some(completion) = completions.recv() => {
                let updates = worker.manager.complete(completion);
                worker.publish_updates(&updates).await;
                worker.publish_properties().await;
                worker.publish_status().await;
            }

            Some(command) = commands.recv() => {
                if configured {
                    worker.handle_command(command);
                } else {
                    warn!(device = %worker.device.name, ?command, "Device not configured, dropping command");
                }
            }
        }
    }

    let cancelled = worker.manager.shutdown();
    info!(device = %worker.device.name, cancelled, "Device worker stopped");
    Ok(())
}

impl<R, K> Worker<R, K>
where
    R: RegisterReader + ?Sized + 'static,
    K: TelemetrySink + ?Sized,
{
    async fn publish_updates(&self, updates: &[FieldUpdate]) {
        for update in updates {
            if !self.interest.is_interested(&update.field) {
                continue;
            }

            let point = TelemetryPoint::from_update(
                &self.device.name,
                update,
                self.descriptors.get(&update.field),
            );
            if let Err(e) = self.sink.publish_point(&point).await {
                warn!(device = %self.device.name, field = %update.field, error = %e, "Failed to publish value");
            }
        }
    }

    async fn publish_properties(&mut self) {
        let properties = self.manager.properties();
        if *properties == self.published_properties {
            return;
        }

        match self.sink.publish_properties(&self.device.name, properties).await {
            Ok(()) => self.published_properties = properties.clone(),
            Err(e) => {
                warn!(device = %self.device.name, error = %e, "Failed to publish device properties")
            }
        }
    }

    async fn publish_status(&mut self) {
        let status = self.manager.status();
        if self.published_status.as_ref() == Some(status) {
            return;
        }

        info!(device = %self.device.name, status = %status, "Device status changed");
        let report = DeviceStatusReport::new(&self.device.name, self.device.family, status.clone());
        match self.sink.publish_status(&report).await {
            Ok(()) => self.published_status = Some(report.status),
            Err(e) => warn!(device = %self.device.name, error = %e, "Failed to publish device status"),
        }
    }

    fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Link(pattern) => {
                if self.interest.link(pattern.clone()) {
                    debug!(device = %self.device.name, channel = %pattern, "Linked");
                    self.interest_changed(&pattern);
                }
            }
            DeviceCommand::Unlink(pattern) => {
                if self.interest.unlink(&pattern) {
                    debug!(device = %self.device.name, channel = %pattern, "Unlinked");
                    self.interest_changed(&pattern);
                }
            }
            DeviceCommand::Refresh(pattern) => {
                let fields = self.one_field_per_range(&pattern);
                if fields.is_empty() {
                    warn!(device = %self.device.name, channel = %pattern, "No channel to refresh");
                }
                for field in fields {
                    self.manager.refresh(&field);
                }
            }
        }
    }

    fn interest_changed(&mut self, pattern: &ChannelPattern) {
        let fields = self.one_field_per_range(pattern);
        for field in fields {
            self.manager.interest_changed(&field, &self.interest);
        }
    }

    /// Pick a representative matching field for every range holding one.
    fn one_field_per_range(&self, pattern: &ChannelPattern) -> Vec<FieldId> {
        let mut seen: HashSet<RangeKey> = HashSet::new();
        let mut fields = Vec::new();

        for range in self.manager.catalog().ranges() {
            if seen.contains(&range.key()) {
                continue;
            }
            if let Some(field) = range.fields().iter().find(|f| pattern.matches(f.id())) {
                seen.insert(range.key());
                fields.push(field.id().clone());
            }
        }
        fields
    }
}
