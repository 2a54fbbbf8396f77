//! CLI argument definitions for scour-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration path, used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/scour/scour.toml";

/// scour container and image janitor.
///
/// Removes stopped containers and stale images according to a removal
/// policy, both on a periodic schedule and in response to runtime events.
#[derive(Parser, Debug)]
#[command(name = "scour-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to scour.toml configuration file.
    ///
    /// When omitted, `/etc/scour/scour.toml` is used if it exists and
    /// built-in defaults otherwise.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Run a single container sweep and image sweep, then exit.
    #[arg(long)]
    pub once: bool,

    /// List removal candidates without removing anything (implies `--once`).
    #[arg(long)]
    pub dry_run: bool,
}

impl DaemonCli {
    /// Whether the daemon should exit after one pass instead of watching.
    pub fn is_one_shot(&self) -> bool {
        self.once || self.dry_run
    }
}
