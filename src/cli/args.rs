//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the distribution engine
#[derive(Debug, Parser)]
#[command(name = "ndn-torrent")]
#[command(about = "A peer-to-peer file distribution engine over NDN", long_about = None)]
pub struct CliArgs {
    /// Path to the initial torrent segment record
    #[arg(value_name = "TORRENT_RECORD")]
    pub torrent_record: PathBuf,

    /// Directory for downloaded file bytes
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Root of the per-torrent record store
    #[arg(long, value_name = "DIR")]
    pub appdata_dir: Option<PathBuf>,

    /// Keep serving content after the download completes
    #[arg(long, default_value_t = true)]
    pub seed: bool,

    /// Bound on in-flight requests
    #[arg(long, default_value_t = crate::manager::DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Consecutive timeouts before rotating peers
    #[arg(long, default_value_t = crate::manager::DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Requests between peer-table re-sorts
    #[arg(long, default_value_t = crate::manager::DEFAULT_SORTING_INTERVAL)]
    pub sorting_interval: u32,

    /// This node's routable prefix, announced to peers
    #[arg(long, value_name = "NAME")]
    pub routable_prefix: Option<String>,

    /// Routable prefix of a known peer (repeatable)
    #[arg(long = "peer", value_name = "NAME")]
    pub peers: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}
