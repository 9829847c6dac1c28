//! Clap derive structures for the `brightline` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// brightline -- drive display brightness through a sync backend
#[derive(Debug, Parser)]
#[command(
    name = "brightline",
    version,
    about = "Control display brightness from the command line",
    long_about = "Reads device snapshots pushed by a brightness backend and sends\n\
        brightness commands to it, reconciling local writes against the\n\
        backend's authoritative state.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, env = "BRIGHTLINE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long, short = 'u', env = "BRIGHTLINE_URL", global = true)]
    pub url: Option<String>,

    /// Use the built-in simulated backend with two displays
    #[arg(long, global = true)]
    pub demo: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BRIGHTLINE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Seconds to wait for the first snapshot or a command outcome
    #[arg(long, default_value = "10", global = true)]
    pub wait: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices from the first snapshot
    #[command(alias = "ls")]
    List,

    /// Print device changes as they arrive
    Watch(WatchArgs),

    /// Set a device's brightness
    Set(SetArgs),

    /// Return a device to its configured center value
    Reset(ResetArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit on disconnect instead of reconnecting
    #[arg(long)]
    pub no_reconnect: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Device id as reported by `list`
    pub id: String,

    /// Target value in the device's configured range
    #[arg(allow_negative_numbers = true)]
    pub value: i32,

    /// Don't wait for the backend's answer (the request is still delivered)
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Device id as reported by `list`
    pub id: String,

    /// Don't wait for the backend's answer (the request is still delivered)
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the effective configuration
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
