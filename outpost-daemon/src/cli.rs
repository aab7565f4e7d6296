//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// Outpost telemetry agent IO daemon.
///
/// Runs the category-addressed ingestion, buffering, flush and
/// fail-cache replay pipeline until a shutdown signal arrives.
#[derive(Parser, Debug)]
#[command(name = "outpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Configuration file; `OUTPOST_*` environment variables override it.
    #[arg(short, long, default_value = "/etc/outpost/outpost.toml")]
    pub config: PathBuf,

    /// Log level filter, e.g. `info` or `outpost_io=debug`. Wins over the file.
    #[arg(long)]
    pub log_level: Option<String>,

    /// `json` or `pretty`. Wins over the file.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Load and check the configuration, print the resolved IO settings, then exit.
    #[arg(long)]
    pub validate: bool,
}
