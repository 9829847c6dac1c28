// ── Domain model ──

mod device;

pub use device::{DeviceId, DeviceRecord, DeviceView, Snapshot, SyncState, UpdateOrigin};
