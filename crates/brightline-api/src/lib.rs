// brightline-api: backend boundary for the brightness sync engine.
//
// Wire types for snapshots and commands, the `BrightnessBackend` seam,
// an HTTP/WebSocket transport and an in-process simulated backend.

pub mod backend;
pub mod error;
pub mod http;
pub mod memory;
pub mod scale;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use backend::{BrightnessBackend, PushFrame, PushSender, PushSubscription};
pub use error::Error;
pub use http::HttpBackend;
pub use memory::{MemoryBackend, PanelScale, SimulatedDisplay};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{Backoff, ReconnectConfig};
pub use wire::{SetBrightnessRequest, WireDevice, WireSnapshot};
