//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "circuitwatch", about = "Circuit safety state and group presence monitor")]
pub struct Cli {
    /// Cloud API base URL
    #[arg(
        long,
        global = true,
        env = "CIRCUITWATCH_API_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub api_url: String,

    /// Bearer token sent with every cloud request
    #[arg(long, global = true, env = "CIRCUITWATCH_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// SQLite snapshot database (default: $XDG_DATA_HOME/circuitwatch/snapshots.db)
    #[arg(long, global = true, env = "CIRCUITWATCH_DB")]
    pub db: Option<PathBuf>,

    /// Group whose roster is tracked
    #[arg(long, global = true, env = "CIRCUITWATCH_GROUP")]
    pub group: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true, default_value = "4000")]
    pub request_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline and stream state and presence as JSON lines
    Run(RunOpts),
    /// One cached read of the circuit state
    Status,
    /// Seconds since the circuit state snapshot was written
    CacheAge,
    /// Remove persisted snapshots (circuit state, and the group roster if set)
    ClearCache,
    /// Publish the local user's location to the group roster
    Share(ShareOpts),
}

#[derive(clap::Args)]
pub struct RunOpts {
    /// UDP address the beacon relay forwards frames to
    #[arg(long, env = "CIRCUITWATCH_RELAY_ADDR", default_value = "127.0.0.1:47800")]
    pub relay_addr: String,

    /// Local user id (display name normalization)
    #[arg(long, env = "CIRCUITWATCH_USER_ID")]
    pub user_id: Option<String>,

    /// Local display name
    #[arg(long, env = "CIRCUITWATCH_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Cloud poll interval in seconds
    #[arg(long, default_value = "5")]
    pub poll_interval: u64,

    /// Cache refresh interval in seconds
    #[arg(long, default_value = "5")]
    pub refresh_interval: u64,
}

#[derive(clap::Args)]
pub struct ShareOpts {
    #[arg(long, env = "CIRCUITWATCH_USER_ID")]
    pub user_id: String,

    #[arg(long, env = "CIRCUITWATCH_DISPLAY_NAME")]
    pub display_name: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    pub latitude: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub longitude: f64,
}

/// Default snapshot database path.
pub fn default_db_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(dir).join("circuitwatch/snapshots.db");
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local/share/circuitwatch/snapshots.db"),
        Err(_) => PathBuf::from("circuitwatch-snapshots.db"),
    }
}
