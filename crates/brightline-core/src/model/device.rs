// ── Device domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mapper::{BrightnessRange, SliderGeometry};

// ── DeviceId ────────────────────────────────────────────────────────

/// Opaque, backend-assigned display identifier.
///
/// Typically a Windows device path such as `\\.\DISPLAY1`; never generated
/// locally and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── Bookkeeping tags ────────────────────────────────────────────────

/// Where the current brightness of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateOrigin {
    /// A pushed snapshot.
    External,
    /// An unconfirmed local write.
    Optimistic,
}

/// Reconciliation state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    Synced,
    PendingOptimistic,
}

// ── DeviceRecord ────────────────────────────────────────────────────

/// One controllable display as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub display_name: String,
    pub brightness: i32,
    pub last_update_origin: UpdateOrigin,
}

impl DeviceRecord {
    /// A record as observed in a snapshot.
    pub fn external(id: impl Into<DeviceId>, display_name: impl Into<String>, brightness: i32) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            brightness,
            last_update_origin: UpdateOrigin::External,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// A validated, complete device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Sequence marker: reflects every command numbered below it.
    /// `None` for backends that do not tag their pushes.
    pub sequence: Option<u64>,
    pub devices: Vec<DeviceRecord>,
}

// ── DeviceView ──────────────────────────────────────────────────────

/// What the presentation layer renders for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub display_name: String,
    pub brightness: i32,
    pub range: BrightnessRange,
    pub center: i32,
    pub sync_state: SyncState,
    pub geometry: SliderGeometry,
    pub label: String,
}

impl DeviceView {
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::PendingOptimistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_serializes_transparently() {
        let id = DeviceId::from(r"\\.\DISPLAY1");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, r#""\\\\.\\DISPLAY1""#);
        assert_eq!(id.to_string(), r"\\.\DISPLAY1");
    }

    #[test]
    fn sync_state_display_is_snake_case() {
        assert_eq!(SyncState::PendingOptimistic.to_string(), "pending_optimistic");
        assert_eq!(UpdateOrigin::External.to_string(), "external");
    }
}
