//! CLI definition using clap derive.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use nowcast_core::Config;

#[derive(Parser)]
#[command(name = "nowcast", about = "Now-playing presence bridge for Discord")]
pub struct Cli {
    /// Control socket path (default: $XDG_RUNTIME_DIR/nowcast/nowcastd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// Config file path (default: $XDG_CONFIG_HOME/nowcast/config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Register the nowcast:// URI scheme handler and exit
    #[arg(long)]
    pub register_uri: bool,

    /// Connect, clear any lingering presence, disconnect, and exit
    #[arg(long)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the presence host (tick loop, control server, join listener)
    Host(HostOpts),
    /// Resolve an inbound sync link (invoked by the URI handler)
    Open(OpenOpts),
    /// Show host status
    Status,
    /// Suspend publishing; sources keep polling
    Pause,
    /// Resume publishing
    Resume,
    /// Clear the published presence
    Clear,
    /// Stop a running host
    Stop,
}

#[derive(clap::Args, Default)]
pub struct HostOpts {
    /// Poll interval in milliseconds (overrides the config file)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(clap::Args)]
pub struct OpenOpts {
    /// Sync link to resolve, e.g. nowcast://sync?track=...&artist=...
    pub uri: String,
}

/// Default control socket path: per-user runtime dir, tmp fallback.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return format!("{dir}/nowcast/nowcastd.sock");
        }
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/nowcast-{user}/nowcastd.sock")
}

/// Default config path: XDG config dir, `~/.config` fallback.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir).join("nowcast/config.toml");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/nowcast/config.toml")
}

/// Load and validate the config file. Host mode needs a complete,
/// valid file; a missing one is an error here.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config at {}", path.display()))?;
    let config = Config::from_toml(&raw)
        .with_context(|| format!("cannot parse config at {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config)
}

/// Lenient load for deep-link resolution: a missing file means
/// defaults (no streaming playback configured), only a present but
/// malformed file is an error.
pub fn load_config_or_default(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config at {}", path.display()))?;
    Config::from_toml(&raw).with_context(|| format!("cannot parse config at {}", path.display()))
}
