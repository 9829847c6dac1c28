//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use brightline_config::ConfigError;
use brightline_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const COMMAND: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the brightness backend")]
    #[diagnostic(
        code(brightline::connection_failed),
        help(
            "Check that the backend is running and the URL is right.\n\
             Reason: {reason}\n\
             Try: brightline --demo list"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Push channel disconnected: {reason}")]
    #[diagnostic(
        code(brightline::disconnected),
        help("Run `brightline watch` to reconnect automatically.")
    )]
    Disconnected { reason: String },

    // ── Devices ──────────────────────────────────────────────────────

    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(brightline::not_found),
        help("Run: brightline list to see available devices")
    )]
    NotFound { identifier: String },

    #[error("Brightness command #{sequence} for '{device}' failed: {message}")]
    #[diagnostic(
        code(brightline::command_failed),
        help("The slider keeps the requested value until the backend reports otherwise.")
    )]
    CommandFailed {
        device: String,
        sequence: u64,
        message: String,
    },

    #[error("Malformed snapshot from backend: {message}")]
    #[diagnostic(code(brightline::decode))]
    Decode { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(brightline::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(brightline::config),
        help("Inspect the effective configuration with: brightline config show")
    )]
    Config(#[from] ConfigError),

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(brightline::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(brightline::timeout),
        help("Increase the wait with --wait or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Session ──────────────────────────────────────────────────────

    #[error("Session error: {message}")]
    #[diagnostic(code(brightline::session))]
    Session { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(brightline::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(brightline::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML serialization failed: {0}")]
    #[diagnostic(code(brightline::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::CommandFailed { .. } => exit_code::COMMAND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Disconnected { reason } => CliError::Disconnected { reason },
            CoreError::NotFound { identifier } => CliError::NotFound { identifier },
            CoreError::Command {
                device,
                sequence,
                message,
            } => CliError::CommandFailed {
                device,
                sequence,
                message,
            },
            CoreError::Decode { message } => CliError::Decode { message },
            CoreError::Domain { message } => CliError::Validation {
                field: "range".into(),
                reason: message,
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "backend".into(),
                reason: message,
            },
            CoreError::SessionClosed => CliError::Session {
                message: "session closed unexpectedly".into(),
            },
            CoreError::Internal(message) => CliError::Session { message },
        }
    }
}
