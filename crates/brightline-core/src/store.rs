// ── Device state store ──
//
// Single source of truth for what the UI shows. Owned by exactly one
// session loop, so it needs no interior locking; every mutation completes
// before the next read.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::model::{DeviceId, DeviceRecord, UpdateOrigin};

/// In-memory device table keyed by id, iterated in snapshot order.
#[derive(Debug, Clone, Default)]
pub struct DeviceStateStore {
    records: IndexMap<DeviceId, DeviceRecord>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the whole device set. Devices not in `records` are gone
    /// afterwards; a repeated id keeps its first position and last value.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = DeviceRecord>) {
        self.records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
    }

    /// Update one record's brightness and origin tag.
    pub fn set_brightness(
        &mut self,
        id: &DeviceId,
        value: i32,
        origin: UpdateOrigin,
    ) -> Result<(), CoreError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(id.as_str()))?;
        record.brightness = value;
        record.last_update_origin = origin;
        Ok(())
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.records.contains_key(id)
    }

    /// All records in snapshot order.
    pub fn list(&self) -> Vec<DeviceRecord> {
        self.records.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
