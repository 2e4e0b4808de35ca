//! ndn-torrent - Main entry point
//!
//! Loads a torrent record, reconstructs the local store, and drives
//! the download / seeding engine.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use ndn_torrent::{
    CliArgs, Config, KeyChain, MemoryFace, Name, ProgressDisplay, TorrentManager, TorrentSegment,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("ndn-torrent starting");
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let segment = load_torrent_record(&config.torrent_record)
        .context("Failed to load torrent record")?;
    let torrent_name = segment.full_name().map_err(anyhow::Error::from)?;
    display_torrent_info(&segment, &torrent_name, &config);

    let manager_config = config.manager_config(torrent_name);
    // A forwarder-backed transport plugs in behind the Face trait;
    // the in-process face serves local store and loopback runs.
    let face = MemoryFace::new();
    let (mut manager, mut events) = TorrentManager::new(manager_config, face)?;
    for peer in &config.peers {
        manager.add_peer(Name::parse(peer));
    }
    if let Some(prefix) = &config.routable_prefix {
        // Never steer requests toward ourselves.
        manager.remove_peer(&Name::parse(prefix));
    }

    manager
        .initialize()
        .await
        .context("Failed to load local store")?;
    info!(
        "local store: {} segments, {} submanifests",
        manager.segments().len(),
        manager.manifests().len()
    );

    let mut progress = ProgressDisplay::new(config.is_quiet());
    progress.print_status("starting download");
    manager.start_download().await?;

    let engine = manager.run();
    tokio::pin!(engine);
    loop {
        tokio::select! {
            result = &mut engine => {
                result?;
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => progress.handle_event(&event),
                    None => break,
                }
            }
        }
    }
    while let Ok(event) = events.try_recv() {
        progress.handle_event(&event);
    }
    progress.print_complete();

    info!("ndn-torrent finished");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Load and verify the initial torrent segment record
fn load_torrent_record(path: &Path) -> Result<TorrentSegment> {
    info!("loading torrent record: {}", path.display());
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read torrent record {}", path.display()))?;
    let segment = TorrentSegment::decode(&bytes)?;
    if !segment.verify(&KeyChain::new()) {
        return Err(anyhow::anyhow!(
            "torrent record {} failed signature verification",
            path.display()
        ));
    }
    Ok(segment)
}

/// Display torrent information
fn display_torrent_info(segment: &TorrentSegment, torrent_name: &Name, config: &Config) {
    if config.is_quiet() {
        return;
    }
    println!("Torrent information:");
    println!("  Name: {}", torrent_name);
    println!("  Files listed in first segment: {}", segment.catalog().len());
    println!(
        "  Chained: {}",
        if segment.next_segment().is_some() {
            "yes"
        } else {
            "terminal segment"
        }
    );
    println!();
    println!("Configuration:");
    println!("  Data directory: {}", config.data_dir.display());
    println!("  Appdata directory: {}", config.appdata_dir.display());
    println!("  Window size: {}", config.window_size);
    println!("  Max retries: {}", config.max_retries);
    println!(
        "  Seeding: {}",
        if config.is_seeding_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Known peers: {}", config.peers.len());
    println!();
}
