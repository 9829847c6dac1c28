// Wire-level types exchanged with the brightness backend.
//
// Snapshots arrive in two observed shapes: a bare array of devices (the
// polling watcher) or an envelope carrying a sequence marker. Both decode
// into `WireSnapshot`; semantic validation (unique ids, value range) is
// the core's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// One device entry as the backend sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDevice {
    pub id: String,
    #[serde(rename = "displayName", alias = "name")]
    pub display_name: String,
    /// Wider than the core's `i32`; range checks happen during ingest.
    pub brightness: i64,
}

/// A full device listing pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSnapshot {
    /// Present when the backend tags snapshots. A sequence of `N` asserts
    /// that every command with a lower sequence is reflected.
    pub sequence: Option<u64>,
    pub devices: Vec<WireDevice>,
}

#[derive(Deserialize)]
struct TaggedSnapshot {
    sequence: u64,
    devices: Vec<WireDevice>,
}

#[derive(Serialize)]
struct TaggedSnapshotRef<'a> {
    sequence: u64,
    devices: &'a [WireDevice],
}

impl WireSnapshot {
    pub fn untagged(devices: Vec<WireDevice>) -> Self {
        Self {
            sequence: None,
            devices,
        }
    }

    pub fn tagged(sequence: u64, devices: Vec<WireDevice>) -> Self {
        Self {
            sequence: Some(sequence),
            devices,
        }
    }

    /// Decode one push message.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|e| decode_error(&e, text))?;

        match value {
            Value::Array(_) => {
                let devices: Vec<WireDevice> =
                    serde_json::from_value(value).map_err(|e| decode_error(&e, text))?;
                Ok(Self::untagged(devices))
            }
            Value::Object(_) => {
                let tagged: TaggedSnapshot =
                    serde_json::from_value(value).map_err(|e| decode_error(&e, text))?;
                Ok(Self::tagged(tagged.sequence, tagged.devices))
            }
            other => Err(Error::Deserialization {
                message: format!("expected a device array or snapshot object, got {}", kind(&other)),
                body: text.to_owned(),
            }),
        }
    }

    /// Encode in the shape matching `sequence`: envelope when tagged,
    /// bare array otherwise.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self.sequence {
            Some(sequence) => serde_json::to_string(&TaggedSnapshotRef {
                sequence,
                devices: &self.devices,
            }),
            None => serde_json::to_string(&self.devices),
        }
    }
}

/// Outbound `setBrightness` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBrightnessRequest {
    pub id: String,
    pub value: i32,
    /// Local dispatch counter of the command. Backends that tag snapshots
    /// echo the highest applied sequence back as `sequence + 1`.
    pub sequence: u64,
}

fn decode_error(err: &serde_json::Error, body: &str) -> Error {
    Error::Deserialization {
        message: err.to_string(),
        body: body.to_owned(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_bare_array() {
        let snap =
            WireSnapshot::from_json(r#"[{"id":"D1","displayName":"Main","brightness":20}]"#)
                .unwrap();
        assert_eq!(snap.sequence, None);
        assert_eq!(
            snap.devices,
            vec![WireDevice {
                id: "D1".into(),
                display_name: "Main".into(),
                brightness: 20,
            }]
        );
    }

    #[test]
    fn decodes_tagged_envelope() {
        let snap = WireSnapshot::from_json(
            r#"{"sequence":6,"devices":[{"id":"D1","displayName":"Main","brightness":-40}]}"#,
        )
        .unwrap();
        assert_eq!(snap.sequence, Some(6));
        assert_eq!(snap.devices[0].brightness, -40);
    }

    #[test]
    fn accepts_name_alias() {
        let snap = WireSnapshot::from_json(r#"[{"id":"D1","name":"Side","brightness":0}]"#).unwrap();
        assert_eq!(snap.devices[0].display_name, "Side");
    }

    #[test]
    fn ignores_unknown_fields() {
        let snap = WireSnapshot::from_json(
            r#"[{"id":"D1","displayName":"Main","brightness":5,"internal":true}]"#,
        )
        .unwrap();
        assert_eq!(snap.devices.len(), 1);
    }

    #[test]
    fn rejects_non_numeric_brightness() {
        let err = WireSnapshot::from_json(r#"[{"id":"D1","displayName":"Main","brightness":"high"}]"#)
            .unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert!(body.contains("high")),
            other => panic!("expected Deserialization, got {other:?}"),
        }
    }

    #[test]
    fn rejects_scalar_payload() {
        let err = WireSnapshot::from_json("42").unwrap_err();
        assert!(err.to_string().contains("a number"), "{err}");
    }

    #[test]
    fn rejects_envelope_without_sequence() {
        assert!(WireSnapshot::from_json(r#"{"devices":[]}"#).is_err());
    }

    #[test]
    fn encodes_in_matching_shape() {
        let devices = vec![WireDevice {
            id: "D1".into(),
            display_name: "Main".into(),
            brightness: 20,
        }];
        let bare = WireSnapshot::untagged(devices.clone()).to_json().unwrap();
        assert!(bare.starts_with('['));
        let tagged = WireSnapshot::tagged(3, devices).to_json().unwrap();
        assert!(tagged.starts_with(r#"{"sequence":3"#), "{tagged}");
    }
}
