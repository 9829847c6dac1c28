// ── Reconciliation ──
//
// Arbitrates between optimistic local writes and pushed snapshots using a
// monotonic dispatch counter instead of wall-clock time.
//
// Per device: `Synced` until a local write, then `PendingOptimistic` with
// the write's sequence recorded. A snapshot overwrites a pending device
// only if its sequence marker is strictly greater than that recorded
// sequence; otherwise the optimistic brightness is kept and only the
// display name is taken from the snapshot.
//
// Untagged snapshots are judged against the settled watermark: the highest
// sequence below which every command has finished, been superseded while
// held, or been dropped with its device. Out-of-order completions wait in
// `finished` until the gap below them closes.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::config::RangeTable;
use crate::error::CoreError;
use crate::mapper::ValueMapper;
use crate::model::{DeviceId, DeviceRecord, DeviceView, Snapshot, SyncState, UpdateOrigin};
use crate::store::DeviceStateStore;

/// An unconfirmed local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    pub value: i32,
    pub sequence: u64,
}

/// What applying one snapshot did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The marker the snapshot was judged by.
    pub marker: u64,
    /// Devices whose optimistic value survived.
    pub retained: Vec<DeviceId>,
    /// Devices that went from pending to synced.
    pub confirmed: Vec<DeviceId>,
    /// Devices that disappeared.
    pub removed: Vec<DeviceId>,
}

/// The reconciliation authority of a session.
#[derive(Debug, Default)]
pub struct SyncController {
    store: DeviceStateStore,
    ranges: RangeTable,
    pending: HashMap<DeviceId, PendingWrite>,
    /// Sequence of the most recent local write; the first write gets 1.
    dispatched: u64,
    /// Every sequence up to and including this one is settled.
    settled: u64,
    /// Settled sequences above `settled`, waiting for the gap to close.
    finished: BTreeSet<u64>,
}

impl SyncController {
    pub fn new(ranges: RangeTable) -> Self {
        Self {
            ranges,
            ..Self::default()
        }
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Merge a snapshot into the store.
    ///
    /// Untagged snapshots are judged by the settled watermark: they are
    /// assumed to reflect every command up to the oldest one still open.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> ApplyOutcome {
        let marker = snapshot.sequence.unwrap_or(self.settled + 1);
        let mut outcome = ApplyOutcome {
            marker,
            ..ApplyOutcome::default()
        };

        let present: HashSet<DeviceId> = snapshot.devices.iter().map(|r| r.id.clone()).collect();
        outcome.removed = self
            .store
            .iter()
            .filter(|r| !present.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        self.pending.retain(|id, _| present.contains(id));

        let mut records = Vec::with_capacity(snapshot.devices.len());
        for mut record in snapshot.devices {
            if let Some(write) = self.pending.get(&record.id).copied() {
                if marker > write.sequence {
                    self.pending.remove(&record.id);
                    outcome.confirmed.push(record.id.clone());
                } else {
                    trace!(
                        device = %record.id,
                        marker,
                        pending = write.sequence,
                        external = record.brightness,
                        "stale snapshot value discarded"
                    );
                    record.brightness = write.value;
                    record.last_update_origin = UpdateOrigin::Optimistic;
                    outcome.retained.push(record.id.clone());
                }
            }
            records.push(record);
        }

        self.store.replace_all(records);
        debug!(
            marker,
            devices = self.store.len(),
            retained = outcome.retained.len(),
            removed = outcome.removed.len(),
            "snapshot applied"
        );
        outcome
    }

    /// Record a local write and return its sequence.
    pub fn write_optimistic(&mut self, id: &DeviceId, value: i32) -> Result<u64, CoreError> {
        if !self.store.contains(id) {
            return Err(CoreError::not_found(id.as_str()));
        }
        let sequence = self.dispatched + 1;
        self.store.set_brightness(id, value, UpdateOrigin::Optimistic)?;
        self.dispatched = sequence;
        self.pending.insert(id.clone(), PendingWrite { value, sequence });
        Ok(sequence)
    }

    /// Note that `sequence` is settled: its request finished, or it will
    /// never be sent.
    pub fn complete(&mut self, sequence: u64) {
        if sequence <= self.settled {
            return;
        }
        self.finished.insert(sequence);
        while self.finished.remove(&(self.settled + 1)) {
            self.settled += 1;
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    pub fn sync_state(&self, id: &DeviceId) -> Option<SyncState> {
        self.store.contains(id).then(|| {
            if self.pending.contains_key(id) {
                SyncState::PendingOptimistic
            } else {
                SyncState::Synced
            }
        })
    }

    pub fn pending(&self, id: &DeviceId) -> Option<PendingWrite> {
        self.pending.get(id).copied()
    }

    /// Sequence of the last local write, 0 before any.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Highest sequence with no open command at or below it.
    pub fn settled(&self) -> u64 {
        self.settled
    }

    pub fn mapper_for(&self, id: &DeviceId) -> &ValueMapper {
        self.ranges.mapper_for(id)
    }

    pub fn view(&self, record: &DeviceRecord) -> DeviceView {
        let mapper = self.mapper_for(&record.id);
        DeviceView {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            brightness: record.brightness,
            range: mapper.range(),
            center: mapper.center(),
            sync_state: if self.pending.contains_key(&record.id) {
                SyncState::PendingOptimistic
            } else {
                SyncState::Synced
            },
            geometry: mapper.geometry(record.brightness),
            label: mapper.label(record.brightness),
        }
    }

    /// Reconciled view of every device, in snapshot order.
    pub fn views(&self) -> Vec<DeviceView> {
        self.store.iter().map(|r| self.view(r)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot(sequence: Option<u64>, devices: &[(&str, &str, i32)]) -> Snapshot {
        Snapshot {
            sequence,
            devices: devices
                .iter()
                .map(|(id, name, b)| DeviceRecord::external(*id, *name, *b))
                .collect(),
        }
    }

    fn brightness(sync: &SyncController, id: &str) -> i32 {
        sync.store().get(&id.into()).unwrap().brightness
    }

    #[test]
    fn first_appearance_is_synced() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 20)]));
        assert_eq!(sync.sync_state(&"D1".into()), Some(SyncState::Synced));
        assert_eq!(sync.sync_state(&"D2".into()), None);
    }

    #[test]
    fn synced_device_takes_lower_external_value() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 60)]));
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 10)]));
        assert_eq!(brightness(&sync, "D1"), 10);
    }

    #[test]
    fn pending_device_keeps_value_until_newer_snapshot() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 0)]));
        for value in [10, 20, 30, 40] {
            sync.write_optimistic(&"D1".into(), value).unwrap();
        }
        let seq = sync.write_optimistic(&"D1".into(), 77).unwrap();
        assert_eq!(seq, 5);

        let outcome = sync.apply_snapshot(snapshot(Some(3), &[("D1", "Renamed", 30)]));
        assert_eq!(outcome.retained, vec![DeviceId::from("D1")]);
        assert_eq!(brightness(&sync, "D1"), 77);
        assert_eq!(sync.store().get(&"D1".into()).unwrap().display_name, "Renamed");
        assert_eq!(
            sync.sync_state(&"D1".into()),
            Some(SyncState::PendingOptimistic)
        );

        let outcome = sync.apply_snapshot(snapshot(Some(6), &[("D1", "Renamed", 76)]));
        assert_eq!(outcome.confirmed, vec![DeviceId::from("D1")]);
        assert_eq!(brightness(&sync, "D1"), 76);
        assert_eq!(sync.sync_state(&"D1".into()), Some(SyncState::Synced));
    }

    #[test]
    fn marker_equal_to_pending_sequence_does_not_confirm() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 0)]));
        let seq = sync.write_optimistic(&"D1".into(), 50).unwrap();

        sync.apply_snapshot(snapshot(Some(seq), &[("D1", "Main", 0)]));
        assert_eq!(brightness(&sync, "D1"), 50);
    }

    #[test]
    fn untagged_snapshot_uses_completion_watermark() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(None, &[("D1", "Main", 20)]));
        let seq = sync.write_optimistic(&"D1".into(), 50).unwrap();

        // Command still in flight: the poll result predates it.
        sync.apply_snapshot(snapshot(None, &[("D1", "Main", 20)]));
        assert_eq!(brightness(&sync, "D1"), 50);

        sync.complete(seq);
        let outcome = sync.apply_snapshot(snapshot(None, &[("D1", "Main", 48)]));
        assert_eq!(outcome.marker, seq + 1);
        assert_eq!(brightness(&sync, "D1"), 48);
        assert_eq!(sync.sync_state(&"D1".into()), Some(SyncState::Synced));
    }

    #[test]
    fn untagged_snapshot_waits_for_oldest_open_command() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(None, &[("D1", "Main", 20), ("D2", "Side", 20)]));
        let s1 = sync.write_optimistic(&"D1".into(), 80).unwrap();
        let s2 = sync.write_optimistic(&"D2".into(), 60).unwrap();

        // D2's command lands first; D1's is still in flight.
        sync.complete(s2);
        assert_eq!(sync.settled(), 0);
        let outcome = sync.apply_snapshot(snapshot(None, &[("D1", "Main", 20), ("D2", "Side", 60)]));
        assert_eq!(outcome.marker, 1);
        assert_eq!(brightness(&sync, "D1"), 80);
        assert_eq!(
            sync.sync_state(&"D1".into()),
            Some(SyncState::PendingOptimistic)
        );

        sync.complete(s1);
        assert_eq!(sync.settled(), 2);
        let outcome = sync.apply_snapshot(snapshot(None, &[("D1", "Main", 79), ("D2", "Side", 60)]));
        assert_eq!(outcome.confirmed.len(), 2);
        assert_eq!(brightness(&sync, "D1"), 79);
    }

    #[test]
    fn repeated_or_stale_completion_is_ignored() {
        let mut sync = SyncController::default();
        sync.complete(1);
        sync.complete(1);
        sync.complete(3);
        assert_eq!(sync.settled(), 1);
        sync.complete(2);
        assert_eq!(sync.settled(), 3);
    }

    #[test]
    fn removed_device_drops_pending_and_rejects_writes() {
        let mut sync = SyncController::default();
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 0), ("D2", "Side", 0)]));
        sync.write_optimistic(&"D2".into(), 5).unwrap();

        let outcome = sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", 0)]));
        assert_eq!(outcome.removed, vec![DeviceId::from("D2")]);
        assert!(sync.pending(&"D2".into()).is_none());
        assert_eq!(sync.store().len(), 1);

        let err = sync.write_optimistic(&"D2".into(), 9).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(sync.dispatched(), 1);
    }

    #[test]
    fn views_carry_range_and_state() {
        let ranges = RangeTable::default()
            .with_device(
                "D1",
                crate::config::RangeSpec {
                    min: -80,
                    max: 100,
                    center: crate::mapper::Center::Value(0),
                },
            )
            .unwrap();
        let mut sync = SyncController::new(ranges);
        sync.apply_snapshot(snapshot(Some(1), &[("D1", "Main", -30)]));

        let views = sync.views();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].range.min(), -80);
        assert_eq!(views[0].center, 0);
        assert_eq!(views[0].label, "-30%");
        assert!(!views[0].is_pending());
    }
}
