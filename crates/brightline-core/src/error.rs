// ── Core error types ──
//
// Reconciliation-level errors. Everything except `Domain` (returned from
// constructors) is non-fatal inside a session: it is published on the
// report channel and the event loop moves on to the next input.
// The `From<brightline_api::Error>` impl translates transport failures.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Reconciliation errors ────────────────────────────────────────
    #[error("Malformed snapshot: {message}")]
    Decode { message: String },

    #[error("Brightness command #{sequence} for {device} failed: {message}")]
    Command {
        device: String,
        sequence: u64,
        message: String,
    },

    #[error("Invalid brightness range: {message}")]
    Domain { message: String },

    #[error("Device not found: {identifier}")]
    NotFound { identifier: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Push channel disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Backend request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Session closed")]
    SessionClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine-readable tag, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Command { .. } => "command",
            Self::Domain { .. } => "domain",
            Self::NotFound { .. } => "not_found",
            Self::ConnectionFailed { .. } => "connection",
            Self::Disconnected { .. } => "disconnected",
            Self::Timeout { .. } => "timeout",
            Self::SessionClosed => "session_closed",
            Self::Config { .. } => "config",
            Self::Internal(_) => "internal",
        }
    }

    pub(crate) fn not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            identifier: identifier.into(),
        }
    }

    pub(crate) fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<brightline_api::Error> for CoreError {
    fn from(err: brightline_api::Error) -> Self {
        match err {
            brightline_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            brightline_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            brightline_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            brightline_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            brightline_api::Error::Rejected { status, message } => CoreError::ConnectionFailed {
                reason: format!("backend answered HTTP {status}: {message}"),
            },
            brightline_api::Error::UnknownDevice { id } => CoreError::NotFound { identifier: id },
            brightline_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            brightline_api::Error::WebSocketClosed { code, reason } => CoreError::Disconnected {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            brightline_api::Error::Deserialization { message, body: _ } => {
                CoreError::Decode { message }
            }
        }
    }
}
