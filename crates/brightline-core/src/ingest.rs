// ── Event ingest ──
//
// Wraps one backend push subscription. Raw frames are decoded and
// validated here so the session loop only ever sees well-formed
// snapshots. A malformed frame is rejected on its own; the channel keeps
// going.

use std::collections::HashSet;

use brightline_api::{BrightnessBackend, PushFrame, PushSubscription, WireSnapshot};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeviceRecord, Snapshot};

/// What the channel produced for one frame.
#[derive(Debug)]
pub enum IngestEvent {
    Snapshot(Snapshot),
    /// A frame that failed to decode or validate. State must not change.
    Rejected(CoreError),
    /// The push transport ended. The channel is closed afterwards.
    Disconnected(CoreError),
}

/// Decode and validate one push frame.
///
/// Rejects empty or duplicate ids and brightness values outside `i32`.
pub fn decode_snapshot(text: &str) -> Result<Snapshot, CoreError> {
    let wire = WireSnapshot::from_json(text)?;

    let mut seen = HashSet::with_capacity(wire.devices.len());
    let mut devices = Vec::with_capacity(wire.devices.len());
    for device in wire.devices {
        if device.id.is_empty() {
            return Err(CoreError::Decode {
                message: "device with empty id".into(),
            });
        }
        if !seen.insert(device.id.clone()) {
            return Err(CoreError::Decode {
                message: format!("duplicate device id {}", device.id),
            });
        }
        let brightness = i32::try_from(device.brightness).map_err(|_| CoreError::Decode {
            message: format!(
                "brightness {} of {} is out of range",
                device.brightness, device.id
            ),
        })?;
        devices.push(DeviceRecord::external(
            device.id,
            device.display_name,
            brightness,
        ));
    }

    Ok(Snapshot {
        sequence: wire.sequence,
        devices,
    })
}

/// The session's single subscription to backend pushes.
#[derive(Debug)]
pub struct EventIngestChannel {
    subscription: Option<PushSubscription>,
    frames: u64,
}

impl EventIngestChannel {
    /// Start watching. Calls `begin_watch` exactly once.
    pub async fn open(backend: &dyn BrightnessBackend) -> Result<Self, CoreError> {
        let subscription = backend.begin_watch().await?;
        info!(backend = backend.name(), "push subscription opened");
        Ok(Self::from_subscription(subscription))
    }

    pub fn from_subscription(subscription: PushSubscription) -> Self {
        Self {
            subscription: Some(subscription),
            frames: 0,
        }
    }

    /// A channel that never yields. Used when the initial watch failed.
    pub fn closed() -> Self {
        Self {
            subscription: None,
            frames: 0,
        }
    }

    /// Wait for the next event. `None` once closed.
    pub async fn next(&mut self) -> Option<IngestEvent> {
        let subscription = self.subscription.as_mut()?;
        let Some(frame) = subscription.recv().await else {
            self.close();
            return Some(IngestEvent::Disconnected(CoreError::Disconnected {
                reason: "push channel ended".into(),
            }));
        };

        match frame {
            PushFrame::Text(text) => {
                self.frames += 1;
                match decode_snapshot(&text) {
                    Ok(snapshot) => {
                        debug!(
                            frame = self.frames,
                            sequence = ?snapshot.sequence,
                            devices = snapshot.devices.len(),
                            "snapshot received"
                        );
                        Some(IngestEvent::Snapshot(snapshot))
                    }
                    Err(e) => {
                        warn!(frame = self.frames, error = %e, "push frame rejected");
                        Some(IngestEvent::Rejected(e))
                    }
                }
            }
            PushFrame::Disconnected { reason } => {
                self.close();
                Some(IngestEvent::Disconnected(CoreError::Disconnected { reason }))
            }
        }
    }

    /// Release the subscription. Returns `true` only on the call that
    /// released it.
    pub fn close(&mut self) -> bool {
        match self.subscription.take() {
            Some(mut subscription) => {
                let released = subscription.close();
                if released {
                    debug!(frames = self.frames, "push subscription released");
                }
                released
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for EventIngestChannel {
    fn drop(&mut self) {
        self.close();
    }
}
