//! Shared configuration for the brightline CLI and TUI.
//!
//! TOML file plus `BRIGHTLINE_` environment overrides, and translation to
//! the runtime types of `brightline-core` (ranges, coalescing) and
//! `brightline-api` (transport, reconnect policy).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

use brightline_api::{ReconnectConfig, TlsMode, TransportConfig};
use brightline_core::{Center, CoalescePolicy, RangeSpec, RangeTable, SessionConfig};

const ENV_PREFIX: &str = "BRIGHTLINE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration shared by CLI and TUI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub ranges: RangesSection,

    /// Per-device settings keyed by backend device id.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendSection {
    /// RPC base URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Push socket URL. Derived from `url` when absent.
    pub events_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            events_url: None,
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:7878".into()
}
fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DispatchSection {
    /// Coalescing window for drag commands; 0 sends every command.
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            coalesce_ms: default_coalesce_ms(),
        }
    }
}

fn default_coalesce_ms() -> u64 {
    40
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Omit to retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,

    /// Log file used by the TUI.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RangesSection {
    #[serde(default)]
    pub default: RangeEntry,

    /// Named ranges that devices opt into via `class`.
    #[serde(default)]
    pub classes: BTreeMap<String, RangeEntry>,
}

/// One `{min, max, center}` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RangeEntry {
    pub min: i32,
    pub max: i32,
    #[serde(default)]
    pub center: CenterSetting,
}

impl Default for RangeEntry {
    fn default() -> Self {
        Self {
            min: -100,
            max: 100,
            center: CenterSetting(Center::Value(0)),
        }
    }
}

impl From<RangeEntry> for RangeSpec {
    fn from(entry: RangeEntry) -> Self {
        Self {
            min: entry.min,
            max: entry.max,
            center: entry.center.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceSection {
    /// Name of a `[ranges.classes.*]` entry.
    pub class: Option<String>,
}

/// `center = 0` or `center = "midpoint"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CenterSetting(pub Center);

impl Serialize for CenterSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Center::Midpoint => serializer.serialize_str("midpoint"),
            Center::Value(v) => serializer.serialize_i32(v),
        }
    }
}

impl<'de> Deserialize<'de> for CenterSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CenterVisitor;

        impl Visitor<'_> for CenterVisitor {
            type Value = CenterSetting;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or \"midpoint\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                i32::try_from(v)
                    .map(|v| CenterSetting(Center::Value(v)))
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i32::try_from(v)
                    .map(|v| CenterSetting(Center::Value(v)))
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v.eq_ignore_ascii_case("midpoint") {
                    return Ok(CenterSetting(Center::Midpoint));
                }
                // Environment overrides arrive as strings.
                v.trim()
                    .parse::<i32>()
                    .map(|v| CenterSetting(Center::Value(v)))
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(CenterVisitor)
    }
}

// ── Translation to runtime types ────────────────────────────────────

impl Config {
    /// Range table and coalescing policy for a session.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut ranges = RangeTable::new(self.ranges.default.into())
            .map_err(|e| ConfigError::validation("ranges.default", e))?;

        for (name, entry) in &self.ranges.classes {
            RangeSpec::from(*entry)
                .mapper()
                .map_err(|e| ConfigError::validation(format!("ranges.classes.{name}"), e))?;
        }

        for (id, device) in &self.devices {
            let Some(class) = &device.class else {
                continue;
            };
            let entry = self.ranges.classes.get(class).ok_or_else(|| {
                ConfigError::validation(
                    format!("devices.\"{id}\".class"),
                    format!("unknown class '{class}'"),
                )
            })?;
            ranges = ranges
                .with_device(id.as_str(), (*entry).into())
                .map_err(|e| ConfigError::validation(format!("ranges.classes.{class}"), e))?;
        }

        Ok(SessionConfig {
            ranges,
            coalesce: CoalescePolicy {
                window: Duration::from_millis(self.dispatch.coalesce_ms),
            },
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        let tls = if self.backend.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca) = self.backend.ca_cert {
            TlsMode::CustomCa(ca.clone())
        } else {
            TlsMode::System
        };
        TransportConfig {
            tls,
            timeout: Duration::from_secs(self.backend.timeout),
        }
    }

    /// Backoff policy for callers that restart sessions, `None` when
    /// reconnecting is disabled.
    pub fn reconnect_config(&self) -> Option<ReconnectConfig> {
        self.reconnect.enabled.then(|| ReconnectConfig {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_retries: self.reconnect.max_retries,
        })
    }

    /// RPC base URL and optional explicit push URL.
    pub fn backend_urls(&self) -> Result<(Url, Option<Url>), ConfigError> {
        let base = Url::parse(&self.backend.url)
            .map_err(|e| ConfigError::validation("backend.url", format!("{e}: {}", self.backend.url)))?;
        let events = self
            .backend
            .events_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| ConfigError::validation("backend.events_url", format!("{e}: {raw}")))
            })
            .transpose()?;
        Ok((base, events))
    }

    /// Check everything the runtime conversions would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session_config()?;
        self.backend_urls()?;
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::validation(
                "reconnect.initial_delay_ms",
                "must not exceed reconnect.max_delay_ms",
            ));
        }
        Ok(())
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "brightline", "brightline").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("brightline");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}
