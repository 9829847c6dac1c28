// ── Runtime session configuration ──
//
// These types describe how a session maps values and paces commands.
// They never touch disk: `brightline-config` builds a `SessionConfig`
// from the user's file and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::CoreError;
use crate::mapper::{BrightnessRange, Center, ValueMapper};
use crate::model::DeviceId;

/// `{min, max, center}` as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub min: i32,
    pub max: i32,
    pub center: Center,
}

impl RangeSpec {
    pub fn mapper(&self) -> Result<ValueMapper, CoreError> {
        ValueMapper::new(BrightnessRange::new(self.min, self.max)?, self.center)
    }
}

impl Default for RangeSpec {
    fn default() -> Self {
        Self {
            min: -100,
            max: 100,
            center: Center::Value(0),
        }
    }
}

/// Per-device mappers with a fallback for devices nobody configured.
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    default: ValueMapper,
    per_device: HashMap<DeviceId, ValueMapper>,
}

impl RangeTable {
    pub fn new(default: RangeSpec) -> Result<Self, CoreError> {
        Ok(Self {
            default: default.mapper()?,
            per_device: HashMap::new(),
        })
    }

    pub fn with_device(mut self, id: impl Into<DeviceId>, spec: RangeSpec) -> Result<Self, CoreError> {
        self.per_device.insert(id.into(), spec.mapper()?);
        Ok(self)
    }

    pub fn mapper_for(&self, id: &DeviceId) -> &ValueMapper {
        self.per_device.get(id).unwrap_or(&self.default)
    }
}

/// Outbound command pacing during a drag.
///
/// With a zero window every command is sent. Otherwise the first command
/// for a device goes out at once, later ones inside the window replace a
/// single held value, and the held value is sent when the window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescePolicy {
    pub window: Duration,
}

impl CoalescePolicy {
    pub const DISABLED: Self = Self {
        window: Duration::ZERO,
    };

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(40),
        }
    }
}

/// Everything a [`Session`](crate::Session) needs besides its backend.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub ranges: RangeTable,
    pub coalesce: CoalescePolicy,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_devices_use_default_range() {
        let table = RangeTable::new(RangeSpec::default())
            .unwrap()
            .with_device(
                "internal",
                RangeSpec {
                    min: -80,
                    max: 100,
                    center: Center::Value(0),
                },
            )
            .unwrap();

        assert_eq!(table.mapper_for(&"internal".into()).range().min(), -80);
        assert_eq!(table.mapper_for(&"other".into()).range().min(), -100);
    }

    #[test]
    fn invalid_device_range_fails_construction() {
        let err = RangeTable::default()
            .with_device(
                "broken",
                RangeSpec {
                    min: 10,
                    max: 10,
                    center: Center::Midpoint,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Domain { .. }));
    }

    #[test]
    fn zero_window_disables_coalescing() {
        assert!(!CoalescePolicy::DISABLED.is_enabled());
        assert!(CoalescePolicy::default().is_enabled());
    }
}
