//! All possible UI actions. Actions are the sole mechanism for state mutation.

use std::fmt;
use std::time::Duration;

use brightline_core::{DeviceId, SessionHandle, Views};

/// Link to the backend as shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Connecting,
    Connected,
    /// Waiting `delay` before restart attempt `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Lost for good; local edits still reach the backend.
    Disconnected(String),
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (#{attempt} in {:.1}s)", delay.as_secs_f64())
            }
            Self::Disconnected(reason) => write!(f, "disconnected: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Footer message, cleared after a few seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Warning,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Info,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    // ── Lifecycle ──
    Quit,
    Tick,
    Render,
    Resize(u16, u16),

    // ── Navigation ──
    SelectNext,
    SelectPrev,

    // ── Gestures ──
    /// Pointer at `position` percent of the device's track.
    Drag { id: DeviceId, position: f64 },
    /// Double-click or `r`: back to the configured center.
    ResetDevice(DeviceId),
    /// Keyboard step to an absolute value.
    Nudge { id: DeviceId, value: i32 },

    // ── Data (from the bridge) ──
    SessionStarted(SessionHandle),
    DevicesUpdated(Views),
    Link(LinkStatus),

    Notify(Notification),
}
