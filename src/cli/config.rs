//! CLI configuration module
//!
//! Validates CLI arguments and turns them into a manager
//! configuration.

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::args::CliArgs;
use crate::manager::ManagerConfig;
use crate::name::Name;

/// Configuration for one engine run
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the initial torrent segment record
    pub torrent_record: PathBuf,
    /// Directory for downloaded file bytes
    pub data_dir: PathBuf,
    /// Root of the per-torrent record store
    pub appdata_dir: PathBuf,
    /// Keep serving after the download completes
    pub seed: bool,
    /// Bound on in-flight requests
    pub window_size: usize,
    /// Consecutive timeouts before rotating peers
    pub max_retries: u32,
    /// Requests between peer-table re-sorts
    pub sorting_interval: u32,
    /// This node's routable prefix
    pub routable_prefix: Option<String>,
    /// Known peers' routable prefixes
    pub peers: Vec<String>,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            torrent_record: args.torrent_record.clone(),
            data_dir: args
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            appdata_dir: args
                .appdata_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".appdata")),
            seed: args.seed,
            window_size: args.window_size,
            max_retries: args.max_retries,
            sorting_interval: args.sorting_interval,
            routable_prefix: args.routable_prefix.clone(),
            peers: args.peers.clone(),
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(anyhow::anyhow!("window_size must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(anyhow::anyhow!("max_retries must be at least 1"));
        }
        if self.sorting_interval == 0 {
            return Err(anyhow::anyhow!("sorting_interval must be at least 1"));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("data_dir cannot be empty"));
        }
        Ok(())
    }

    /// Build the manager configuration for `torrent_name`.
    pub fn manager_config(&self, torrent_name: Name) -> ManagerConfig {
        let mut config = ManagerConfig::new(torrent_name);
        config.data_dir = self.data_dir.clone();
        config.appdata_dir = self.appdata_dir.clone();
        config.seed = self.seed;
        config.window_size = self.window_size;
        config.max_retries = self.max_retries;
        config.sorting_interval = self.sorting_interval;
        if let Some(prefix) = &self.routable_prefix {
            config.own_routable_prefix = Name::parse(prefix);
        }
        config
    }

    /// Check if seeding should stay on after the download
    pub fn is_seeding_enabled(&self) -> bool {
        self.seed
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
