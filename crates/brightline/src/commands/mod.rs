//! Command dispatch: bridges CLI args -> session operations -> output formatting.

pub mod config_cmd;
pub mod devices;

use std::sync::Arc;

use brightline_core::{BrightnessBackend, SessionConfig};

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    backend: Arc<dyn BrightnessBackend>,
    session_config: SessionConfig,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::List => devices::list(backend, session_config, global).await,
        Command::Watch(args) => {
            devices::watch(backend, session_config, cfg, &args, global).await
        }
        Command::Set(args) => devices::set(backend, session_config, &args, global).await,
        Command::Reset(args) => devices::reset(backend, session_config, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
