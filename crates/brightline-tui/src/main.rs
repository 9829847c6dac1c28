//! `brightline-tui`: live brightness sliders in the terminal.
//!
//! Each display gets a center-anchored slider that can be dragged,
//! double-clicked to reset, or stepped from the keyboard. Local edits show
//! immediately and are reconciled against the backend's snapshots.
//!
//! Logs go to a file (default `/tmp/brightline-tui.log`) so they never
//! corrupt the terminal.

mod action;
mod app;
mod component;
mod data_bridge;
mod event;
mod screens;
mod theme;
mod tui;
mod widgets;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use brightline_config::Config;
use brightline_core::{BrightnessBackend, HttpBackend, MemoryBackend};

use crate::app::App;

const DEFAULT_LOG_FILE: &str = "/tmp/brightline-tui.log";

/// Terminal sliders for a brightness sync backend.
#[derive(Parser, Debug)]
#[command(name = "brightline-tui", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, env = "BRIGHTLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(short = 'u', long, env = "BRIGHTLINE_URL")]
    url: Option<String>,

    /// Use the built-in simulated backend
    #[arg(long)]
    demo: bool,

    /// Log file path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// File-only tracing. The guard must live until exit so logs flush.
fn setup_tracing(cli: &Cli, cfg: &Config) -> WorkerGuard {
    let level = match cli.verbose {
        0 => cfg.logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "brightline_tui={level},brightline_core={level},brightline_api={level}"
        ))
    });

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| cfg.logging.file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    let dir = log_file.parent().unwrap_or(Path::new("/tmp"));
    let name = log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("brightline-tui.log"));

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(brightline_config::config_path);
    let mut cfg = brightline_config::load_config_from(&path)
        .wrap_err_with(|| format!("loading {}", path.display()))?;
    if let Some(ref url) = cli.url {
        cfg.backend.url.clone_from(url);
        cfg.backend.events_url = None;
        cfg.validate()?;
    }
    Ok(cfg)
}

fn build_backend(cli: &Cli, cfg: &Config) -> Result<Arc<dyn BrightnessBackend>> {
    if cli.demo {
        return Ok(Arc::new(MemoryBackend::demo()));
    }
    let (base, events) = cfg.backend_urls()?;
    let backend = HttpBackend::new(base, events, &cfg.transport_config())?;
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Hooks first so startup failures restore the terminal too
    tui::install_hooks()?;

    let cfg = load_config(&cli)?;
    let _log_guard = setup_tracing(&cli, &cfg);

    let backend = build_backend(&cli, &cfg)?;
    info!(backend = backend.name(), demo = cli.demo, "starting brightline-tui");

    let mut app = App::new(backend, cfg.session_config()?, cfg.reconnect_config());
    app.run().await
}
