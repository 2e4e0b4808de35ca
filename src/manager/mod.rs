//! Torrent manager
//!
//! Drives the end-to-end download state machine for one torrent:
//! windowed request pipelining with retry and peer rotation, the
//! disk-backed store of segments, manifests and packet bitmaps, and
//! the interest-serving side that re-serves whatever is locally
//! complete.

pub mod download;
pub mod pipeline;
pub mod queue;

pub use pipeline::Pipeline;
pub use queue::{InterestQueue, QueuedInterest};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::face::{Face, FaceEvent, Interest};
use crate::metadata::{name_type, FileManifest, KeyChain, NameType, TorrentSegment};
use crate::name::Name;
use crate::peers::{PeerCursor, PeerRecord, StatsTable, UpdateHandler};
use crate::storage::{packetizer, store, FileState, StoreLayout};

/// Default bound on in-flight requests.
pub const DEFAULT_WINDOW_SIZE: usize = 25;
/// Default consecutive-timeout threshold before rotating peers.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default number of request constructions between table re-sorts.
pub const DEFAULT_SORTING_INTERVAL: u32 = 100;

/// What to do when an outstanding request completes.
#[derive(Debug)]
pub enum Continuation {
    /// Advance the torrent metadata chain.
    TorrentSegment,
    /// Advance a file's manifest chain, accumulating packet names.
    ManifestSegment { packets: Vec<Name> },
    /// Store a data packet.
    DataPacket,
}

/// Progress notifications surfaced to the embedding application.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A torrent segment arrived; its catalog names manifest chains.
    TorrentSegmentReceived { catalog: Vec<Name> },
    /// A file's manifest chain finished; `packets` accumulates the
    /// catalogs fetched along the way.
    ManifestChainComplete { packets: Vec<Name> },
    /// A data packet is durably stored (or already was).
    PacketStored { name: Name },
    /// A request failed and will be retried.
    RequestFailed { name: Name, reason: String },
}

/// Identity and tunables for one torrent manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Full name of the initial torrent segment.
    pub torrent_name: Name,
    /// Where downloaded file bytes live.
    pub data_dir: PathBuf,
    /// Root of the per-torrent record store.
    pub appdata_dir: PathBuf,
    /// Keep serving after the download completes.
    pub seed: bool,
    /// Bound on in-flight requests.
    pub window_size: usize,
    /// Consecutive timeouts before the peer cursor advances.
    pub max_retries: u32,
    /// Request constructions between stats-table re-sorts.
    pub sorting_interval: u32,
    /// Lifetime attached to every outgoing request.
    pub interest_lifetime: Duration,
    /// This node's routable prefix, empty when not announced.
    pub own_routable_prefix: Name,
}

impl ManagerConfig {
    /// Defaults for downloading `torrent_name`.
    pub fn new(torrent_name: Name) -> Self {
        ManagerConfig {
            torrent_name,
            data_dir: PathBuf::from("./downloads"),
            appdata_dir: PathBuf::from(".appdata"),
            seed: true,
            window_size: DEFAULT_WINDOW_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            sorting_interval: DEFAULT_SORTING_INTERVAL,
            interest_lifetime: Duration::from_secs(2),
            own_routable_prefix: Name::new(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window_size == 0 {
            return Err(EngineError::config_error_with_field(
                "window_size must be at least 1",
                "window_size",
            ));
        }
        if self.max_retries == 0 {
            return Err(EngineError::config_error_with_field(
                "max_retries must be at least 1",
                "max_retries",
            ));
        }
        if self.sorting_interval == 0 {
            return Err(EngineError::config_error_with_field(
                "sorting_interval must be at least 1",
                "sorting_interval",
            ));
        }
        if TorrentSegment::torrent_id(&self.torrent_name).is_none() {
            return Err(EngineError::config_error_with_field(
                "torrent_name does not contain a torrent-file component",
                "torrent_name",
            ));
        }
        Ok(())
    }
}

/// The per-torrent engine. Owns all state; a single event loop
/// services face events serially, so nothing is shared across
/// threads.
pub struct TorrentManager<F: Face> {
    config: ManagerConfig,
    face: F,
    key_chain: KeyChain,
    layout: StoreLayout,
    segments: Vec<TorrentSegment>,
    manifests: Vec<FileManifest>,
    file_states: HashMap<Name, FileState>,
    sub_manifest_sizes: HashMap<Name, u64>,
    queue: InterestQueue,
    pipeline: Pipeline,
    stats: StatsTable,
    cursor: PeerCursor,
    update_handler: UpdateHandler,
    retries: u32,
    sorting_counter: u32,
    registered_prefixes: HashSet<Name>,
    events: mpsc::UnboundedSender<ManagerEvent>,
    done: bool,
}

impl<F: Face> TorrentManager<F> {
    /// Create a manager over `face`, returning it together with the
    /// receiving end of its progress events.
    pub fn new(
        config: ManagerConfig,
        face: F,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ManagerEvent>)> {
        config.validate()?;
        let torrent_id = TorrentSegment::torrent_id(&config.torrent_name).ok_or_else(|| {
            EngineError::config_error_with_field("unusable torrent name", "torrent_name")
        })?;
        let layout = StoreLayout::new(&config.appdata_dir, &torrent_id, &config.data_dir);
        let torrent_scope = TorrentSegment::torrent_file_prefix(&config.torrent_name)
            .map(|p| p.parent())
            .unwrap_or_default();
        let update_handler =
            UpdateHandler::new(torrent_scope, config.own_routable_prefix.clone());
        let (events, receiver) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(config.window_size);
        Ok((
            TorrentManager {
                config,
                face,
                key_chain: KeyChain::new(),
                layout,
                segments: Vec::new(),
                manifests: Vec::new(),
                file_states: HashMap::new(),
                sub_manifest_sizes: HashMap::new(),
                queue: InterestQueue::new(),
                pipeline,
                stats: StatsTable::new(),
                cursor: PeerCursor::new(),
                update_handler,
                retries: 0,
                sorting_counter: 0,
                registered_prefixes: HashSet::new(),
                events,
                done: false,
            },
            receiver,
        ))
    }

    /// Add a peer's routable name to the preference table.
    pub fn add_peer(&mut self, name: Name) {
        self.stats.insert(PeerRecord::new(name));
        self.update_handler.mark_dirty();
    }

    /// Drop a peer (for instance this node's own routable prefix)
    /// from the table, reseating the cursor.
    pub fn remove_peer(&mut self, name: &Name) {
        if self.stats.erase(name) {
            self.cursor.reset(&self.stats);
            self.retries = 0;
        }
    }

    /// The verified torrent segments held, in chain order.
    pub fn segments(&self) -> &[TorrentSegment] {
        &self.segments
    }

    /// The submanifests held, ordered by file then submanifest number.
    pub fn manifests(&self) -> &[FileManifest] {
        &self.manifests
    }

    /// Number of in-flight requests.
    pub fn pending_len(&self) -> usize {
        self.pipeline.len()
    }

    /// Number of requests queued but not yet in flight.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Consecutive timeouts since the last successful reception.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether the manager reached its shutdown condition.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The peer preference table.
    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    /// The face this manager drives.
    pub fn face(&self) -> &F {
        &self.face
    }

    /// Mutable access to the face.
    pub fn face_mut(&mut self) -> &mut F {
        &mut self.face
    }

    pub(crate) fn emit(&self, event: ManagerEvent) {
        // The receiver may be gone; progress is best-effort.
        let _ = self.events.send(event);
    }

    // ---------------------------------------------------------------
    // Startup reconstruction
    // ---------------------------------------------------------------

    /// Rebuild verified in-memory chains from the on-disk store and
    /// seed whatever is locally complete.
    pub async fn initialize(&mut self) -> Result<()> {
        let torrent_dir = self.layout.torrent_files_dir();
        if !store::exists(&torrent_dir).await {
            debug!("no store at {}; starting empty", torrent_dir.display());
            return Ok(());
        }
        let loaded = store::load_segments(&torrent_dir).await?;
        self.segments = self.verify_segment_chain(loaded);
        if self.segments.is_empty() {
            return Ok(());
        }
        info!("restored {} torrent segments", self.segments.len());

        let manifests_dir = self.layout.manifests_dir();
        let loaded = if store::exists(&manifests_dir).await {
            store::load_manifests(&manifests_dir).await?
        } else {
            Vec::new()
        };
        self.manifests = self.verify_manifest_chains(loaded);
        info!("restored {} submanifests", self.manifests.len());

        for manifest in &self.manifests {
            if manifest.submanifest_number() == Some(0) {
                self.sub_manifest_sizes
                    .insert(manifest.file_name(), manifest.catalog().len() as u64);
            }
        }

        // Rebuild packet bitmaps by re-packetizing whatever file
        // bytes are on disk; catalog membership is authoritative.
        let manifests = self.manifests.clone();
        for manifest in &manifests {
            let file_path = self.layout.data_file_path(&manifest.file_name());
            if fs::metadata(&file_path).await.is_err() {
                if let Some(parent) = file_path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                continue;
            }
            let Some(&sub_size) = self.sub_manifest_sizes.get(&manifest.file_name()) else {
                continue;
            };
            let Some(sub_number) = manifest.submanifest_number() else {
                continue;
            };
            let packets = packetizer::packetize_file(
                &file_path,
                manifest.name(),
                manifest.packet_size(),
                sub_size,
                sub_number,
                &self.key_chain,
            )
            .await?;
            if packets.is_empty() {
                continue;
            }
            let full = manifest.full_name()?;
            let mut state = self
                .file_states
                .remove(&full)
                .unwrap_or_else(|| FileState::new(manifest.catalog().len()));
            for packet in &packets {
                let packet_full = packet.full_name()?;
                if let Some(index) =
                    manifest.catalog().iter().position(|n| *n == packet_full)
                {
                    state.set(index);
                }
            }
            self.file_states.insert(full, state);
        }

        let mut to_seed = Vec::new();
        for segment in &self.segments {
            to_seed.push(segment.full_name()?);
        }
        for manifest in &self.manifests {
            to_seed.push(manifest.full_name()?);
        }
        for name in to_seed {
            self.seed(&name).await?;
        }
        Ok(())
    }

    /// Walk loaded segments from the configured initial name,
    /// keeping only the verified prefix of the chain.
    fn verify_segment_chain(&self, loaded: Vec<TorrentSegment>) -> Vec<TorrentSegment> {
        let mut verified = Vec::new();
        let mut expected = self.config.torrent_name.clone();
        for segment in loaded {
            if !segment.verify(&self.key_chain) {
                warn!("segment {} failed signature verification", segment.name());
                break;
            }
            match segment.full_name() {
                Ok(full) if full == expected => {}
                _ => {
                    warn!("segment chain broken at {}; truncating", segment.name());
                    break;
                }
            }
            let next = segment.next_segment().cloned();
            verified.push(segment);
            match next {
                Some(name) => expected = name,
                None => break,
            }
        }
        verified
    }

    /// Walk loaded submanifests along each chain named by the torrent
    /// catalogs. A mismatch taints the rest of that file's records.
    fn verify_manifest_chains(&self, loaded: Vec<FileManifest>) -> Vec<FileManifest> {
        let mut by_file: Vec<(Name, Vec<FileManifest>)> = Vec::new();
        for manifest in loaded {
            let file = manifest.file_name();
            match by_file.iter_mut().find(|(f, _)| *f == file) {
                Some((_, group)) => group.push(manifest),
                None => by_file.push((file, vec![manifest])),
            }
        }

        let initial_names: Vec<Name> = self
            .segments
            .iter()
            .flat_map(|s| s.catalog().iter().cloned())
            .collect();

        let mut output = Vec::new();
        for initial in initial_names {
            let file = FileManifest::manifest_prefix(&initial);
            let Some(position) = by_file.iter().position(|(f, _)| *f == file) else {
                continue;
            };
            let (_, group) = by_file.remove(position);
            let mut expected = initial;
            for manifest in group {
                if !manifest.verify(&self.key_chain) {
                    warn!("manifest {} failed signature verification", manifest.name());
                    break;
                }
                match manifest.full_name() {
                    Ok(full) if full == expected => {}
                    _ => {
                        warn!("manifest chain broken at {}; dropping tail", manifest.name());
                        break;
                    }
                }
                let next = manifest.next_submanifest().cloned();
                output.push(manifest);
                match next {
                    Some(name) => expected = name,
                    None => break,
                }
            }
        }
        output.sort_by(|a, b| {
            a.file_name()
                .cmp(&b.file_name())
                .then(a.submanifest_number().cmp(&b.submanifest_number()))
        });
        output
    }

    // ---------------------------------------------------------------
    // Event loop
    // ---------------------------------------------------------------

    /// Drive the manager until shutdown or until the face closes.
    pub async fn run(&mut self) -> Result<()> {
        self.send_interests().await?;
        self.check_shutdown();
        while !self.done {
            match self.face.next_event().await {
                Some(event) => self.handle_face_event(event).await?,
                None => break,
            }
        }
        Ok(())
    }

    /// Service one face event.
    pub async fn handle_face_event(&mut self, event: FaceEvent) -> Result<()> {
        match event {
            FaceEvent::Data { interest, data } => self.handle_data(interest, data).await,
            FaceEvent::Timeout { interest } => self.handle_timeout(interest).await,
            FaceEvent::Nack { interest, reason } => self.handle_nack(interest, reason).await,
            FaceEvent::InterestReceived { interest } => {
                self.handle_incoming_interest(interest).await
            }
            FaceEvent::RegisterFailed { prefix, reason } => {
                error!("failed to register prefix {}: {}", prefix, reason);
                self.done = true;
                Ok(())
            }
        }
    }

    /// Drain the queue into the face while the window has room.
    pub async fn send_interests(&mut self) -> Result<()> {
        while self.pipeline.has_capacity() && !self.queue.is_empty() {
            let Some(queued) = self.queue.pop() else {
                break;
            };
            let (interest, probe) = self.create_interest(queued.name.clone());
            self.pipeline.insert(queued.name, queued.continuation);
            if let Some(probe) = probe {
                self.face.express_interest(probe).await?;
            }
            debug!("sending {}", interest.name());
            self.face.express_interest(interest).await?;
        }
        Ok(())
    }

    /// Build an outgoing request: fixed lifetime, must-be-fresh, and
    /// a forwarding hint naming the currently preferred peer. Every
    /// `sorting_interval` constructions the table is re-sorted and an
    /// ALIVE probe may be due.
    fn create_interest(&mut self, name: Name) -> (Interest, Option<Interest>) {
        let mut interest = Interest::new(name);
        interest.set_lifetime(self.config.interest_lifetime);
        interest.set_must_be_fresh(true);
        if let Some(peer) = self.cursor.current(&mut self.stats) {
            interest.set_forwarding_hint(peer.record_name().clone());
            peer.increment_sent_interests();
        }

        let mut probe = None;
        self.sorting_counter += 1;
        if self.sorting_counter >= self.config.sorting_interval {
            if self.update_handler.needs_update() {
                if let Some(index) = self.cursor.position(&self.stats) {
                    if let Some(peer) = self.stats.get(index) {
                        probe = Some(self.update_handler.alive_interest(peer));
                    }
                }
            }
            self.sorting_counter = 0;
            self.stats.sort();
            self.cursor.reset(&self.stats);
            self.retries = 0;
        }
        (interest, probe)
    }

    pub(crate) fn check_shutdown(&mut self) {
        if self.pipeline.is_empty() && self.queue.is_empty() && !self.config.seed {
            debug!("no outstanding work and seeding disabled; shutting down");
            self.done = true;
        }
    }

    // ---------------------------------------------------------------
    // Seeding and inbound service
    // ---------------------------------------------------------------

    /// Register an inbound prefix filter for a locally held object,
    /// but only once everything under that prefix can be answered.
    pub async fn seed(&mut self, full_name: &Name) -> Result<()> {
        let prefix = match name_type(full_name) {
            NameType::TorrentFile => {
                if self.has_all_torrent_segments() {
                    TorrentSegment::torrent_file_prefix(full_name)
                } else {
                    None
                }
            }
            NameType::FileManifest => {
                if self.has_all_manifest_segments(full_name) {
                    Some(FileManifest::manifest_prefix(full_name))
                } else {
                    None
                }
            }
            // Data packets are covered by their manifest's prefix.
            NameType::DataPacket | NameType::Unknown => None,
        };
        let Some(prefix) = prefix else {
            return Ok(());
        };
        if !self.registered_prefixes.insert(prefix.clone()) {
            return Ok(());
        }
        info!("registering prefix {}", prefix);
        self.face.register_prefix(prefix).await?;
        Ok(())
    }

    fn has_all_torrent_segments(&self) -> bool {
        // The chain is built by verified appends, so holding the
        // terminal segment means holding the whole chain.
        self.segments
            .last()
            .map_or(false, |last| last.next_segment().is_none())
    }

    fn has_all_manifest_segments(&self, full_name: &Name) -> bool {
        let file = FileManifest::manifest_prefix(full_name);
        let of_file: Vec<&FileManifest> = self
            .manifests
            .iter()
            .filter(|m| m.file_name() == file)
            .collect();
        match of_file.last() {
            Some(last) => {
                last.next_submanifest().is_none()
                    && last
                        .submanifest_number()
                        .map_or(false, |n| of_file.len() as u64 == n + 1)
            }
            None => false,
        }
    }

    /// Answer an inbound request from local content: segments and
    /// manifests by full-name equality, packets through the bitmap
    /// and the on-disk packetizer.
    async fn handle_incoming_interest(&mut self, interest: Interest) -> Result<()> {
        let name = interest.name().clone();
        debug!("inbound request for {}", name);

        for segment in &self.segments {
            if segment.full_name()? == name {
                let data = segment.to_data()?;
                self.face.put(data).await?;
                return Ok(());
            }
        }
        for manifest in &self.manifests {
            if manifest.full_name()? == name {
                let data = manifest.to_data()?;
                self.face.put(data).await?;
                return Ok(());
            }
        }

        // Strip packet number and digest to find the owning manifest.
        let manifest_name = name.prefix(name.len().saturating_sub(2));
        let packet_number = name.get(-2).and_then(|c| c.to_sequence_number());
        let present = packet_number.map_or(false, |number| {
            self.file_states
                .iter()
                .find(|(full, _)| manifest_name.is_prefix_of(full))
                .map_or(false, |(_, state)| state.is_set(number as usize))
        });
        if present {
            let manifest = self
                .manifests
                .iter()
                .find(|m| manifest_name.is_prefix_of(m.name()));
            if let Some(manifest) = manifest {
                if let Some(&sub_size) = self.sub_manifest_sizes.get(&manifest.file_name()) {
                    let path = self.layout.data_file_path(&manifest.file_name());
                    let packet =
                        packetizer::read_packet(&name, manifest, sub_size, &path, &self.key_chain)
                            .await?;
                    self.face.put(packet).await?;
                    return Ok(());
                }
            }
        }

        // TODO(serve): answer with an application-level NACK instead
        // of staying silent.
        warn!("no local content for inbound request {}", name);
        Ok(())
    }
}
