// brightline-core: reconciliation engine between optimistic slider writes
// and authoritative backend snapshots.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod mapper;
pub mod model;
pub mod session;
pub mod store;
pub mod stream;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CoalescePolicy, RangeSpec, RangeTable, SessionConfig};
pub use error::CoreError;
pub use ingest::{EventIngestChannel, IngestEvent, decode_snapshot};
pub use mapper::{BrightnessRange, Center, Fill, SliderGeometry, ValueMapper};
pub use session::{CommandOutcome, ConnectionState, Session, SessionHandle};
pub use store::DeviceStateStore;
pub use stream::{DeviceStream, Views};
pub use sync::SyncController;

pub use model::{DeviceId, DeviceRecord, DeviceView, Snapshot, SyncState, UpdateOrigin};

// The backend seam is part of the public surface.
pub use brightline_api::{
    Backoff, BrightnessBackend, HttpBackend, MemoryBackend, ReconnectConfig, SimulatedDisplay,
};
