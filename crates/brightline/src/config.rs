//! CLI configuration: thin wrapper around `brightline_config`.
//!
//! Adds `GlobalOpts`-aware resolution (--config, --url, --insecure, --demo)
//! on top of the shared loader.

use std::path::PathBuf;
use std::sync::Arc;

use brightline_core::{BrightnessBackend, CoreError, HttpBackend, MemoryBackend};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use brightline_config::{Config, load_config_from, save_config_to};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Config file in effect: `--config` or the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(brightline_config::config_path)
}

/// Load the config file and apply flag overrides.
pub fn resolve(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = load_config_from(&active_path(global))?;
    if let Some(ref url) = global.url {
        cfg.backend.url.clone_from(url);
        cfg.backend.events_url = None;
    }
    if global.insecure {
        cfg.backend.insecure = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// The backend selected by flags and config.
pub fn build_backend(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<Arc<dyn BrightnessBackend>, CliError> {
    if global.demo {
        tracing::debug!("using simulated demo backend");
        return Ok(Arc::new(MemoryBackend::demo()));
    }

    let (base, events) = cfg.backend_urls()?;
    let backend =
        HttpBackend::new(base, events, &cfg.transport_config()).map_err(CoreError::from)?;
    tracing::debug!(
        url = %backend.base_url(),
        events = %backend.events_url(),
        "using network backend"
    );
    Ok(Arc::new(backend))
}
