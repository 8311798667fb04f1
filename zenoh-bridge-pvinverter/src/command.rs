//! Runtime interest commands received on `<prefix>/<device>/@/command`.
//!
//! Payload is JSON: `{"command": "link" | "unlink" | "refresh", "channel": "<pattern>"}`
//! where the pattern is `group#name`, `group#*` or `*`.

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};
use zenoh::sample::SampleKind;

use crate::error::{Error, Result};
use crate::interest::ChannelPattern;

/// Commands a device worker may have queued before new ones are dropped.
pub const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CommandKind {
    Link,
    Unlink,
    Refresh,
}

#[derive(Debug, Deserialize)]
struct CommandMessage {
    command: CommandKind,
    channel: String,
}

/// A parsed device command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Start publishing the matching channels.
    Link(ChannelPattern),
    /// Stop publishing a previously linked pattern.
    Unlink(ChannelPattern),
    /// Read the matching channels once, now.
    Refresh(ChannelPattern),
}

impl DeviceCommand {
    /// Parse a JSON command payload.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let message: CommandMessage = serde_json::from_slice(payload)?;
        let pattern = ChannelPattern::parse(&message.channel)
            .ok_or_else(|| Error::Command(format!("invalid channel '{}'", message.channel)))?;

        Ok(match message.command {
            CommandKind::Link => DeviceCommand::Link(pattern),
            CommandKind::Unlink => DeviceCommand::Unlink(pattern),
            CommandKind::Refresh => DeviceCommand::Refresh(pattern),
        })
    }
}

/// Forward commands published on `key_expr` to a device worker until shutdown.
pub async fn listen(
    session: zenoh::Session,
    key_expr: String,
    commands: mpsc::Sender<DeviceCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let subscriber = session.declare_subscriber(&key_expr).await?;
    info!(key_expr = %key_expr, "Listening for device commands");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(key_expr = %key_expr, "Command listener stopping");
                    break;
                }
            }

            sample = subscriber.recv_async() => {
                let sample = match sample {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!("Error receiving command: {}", e);
                        break;
                    }
                };

                if sample.kind() == SampleKind::Delete {
                    trace!(key = %sample.key_expr(), "Ignoring delete sample");
                    continue;
                }

                let payload = sample.payload().to_bytes();
                match DeviceCommand::from_json(&payload) {
                    Ok(command) => {
                        debug!(key = %sample.key_expr(), ?command, "Received command");
                        match commands.try_send(command) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(command)) => {
                                warn!(key = %sample.key_expr(), ?command, "Command queue full, dropping command");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    Err(e) => {
                        warn!(key = %sample.key_expr(), error = %e, "Rejected command");
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvsight_modbus::FieldId;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            DeviceCommand::from_json(br#"{"command":"link","channel":"consumption#total-dc-power"}"#)
                .unwrap(),
            DeviceCommand::Link(ChannelPattern::Exact(FieldId::new(
                "consumption",
                "total-dc-power"
            )))
        );
        assert_eq!(
            DeviceCommand::from_json(br#"{"command":"unlink","channel":"statistics#*"}"#).unwrap(),
            DeviceCommand::Unlink(ChannelPattern::Group("statistics".into()))
        );
        assert_eq!(
            DeviceCommand::from_json(br#"{"command":"refresh","channel":"*"}"#).unwrap(),
            DeviceCommand::Refresh(ChannelPattern::All)
        );
    }

    #[test]
    fn test_reject_bad_commands() {
        assert!(matches!(
            DeviceCommand::from_json(br#"{"command":"write","channel":"*"}"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            DeviceCommand::from_json(br#"{"command":"link","channel":"consumption"}"#),
            Err(Error::Command(_))
        ));
        assert!(DeviceCommand::from_json(b"not json").is_err());
    }
}
