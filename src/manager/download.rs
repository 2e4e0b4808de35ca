//! Download state machines
//!
//! Three cooperative machines advance as completions arrive: the
//! torrent metadata chain, per-file manifest chains, and leaf data
//! packets. Recursion goes through the interest queue, so call
//! stacks never deepen.

use anyhow::Result;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::EngineError;
use crate::face::{Face, Interest};
use crate::metadata::{Data, FileManifest, TorrentSegment};
use crate::name::Name;
use crate::storage::{packetizer, store, FileState};

use crate::manager::{Continuation, ManagerEvent, TorrentManager};

impl<F: Face> TorrentManager<F> {
    /// Kick off the end-to-end download: the torrent chain first,
    /// then the manifest chains already known from a partial store.
    pub async fn start_download(&mut self) -> Result<()> {
        self.download_torrent_file().await?;
        let known: Vec<Name> = self
            .segments()
            .iter()
            .flat_map(|s| s.catalog().iter().cloned())
            .collect();
        for name in known {
            self.download_file_manifest(name).await?;
        }
        self.check_shutdown();
        Ok(())
    }

    /// Fetch the next missing torrent segment, or surface the held
    /// catalogs when the chain is already complete.
    pub async fn download_torrent_file(&mut self) -> Result<()> {
        match self.find_torrent_segment_to_download() {
            Some(name) => self.enqueue(name, Continuation::TorrentSegment).await,
            None => {
                let manifests = self.find_file_manifests_to_download();
                self.emit(ManagerEvent::TorrentSegmentReceived {
                    catalog: manifests.clone(),
                });
                for name in manifests {
                    self.download_file_manifest(name).await?;
                }
                Ok(())
            }
        }
    }

    /// Advance the manifest chain that `manifest_name` belongs to,
    /// or move on to its data packets when the chain is held.
    pub async fn download_file_manifest(&mut self, manifest_name: Name) -> Result<()> {
        match self.find_manifest_segment_to_download(&manifest_name) {
            Some(segment_name) => {
                self.enqueue(
                    segment_name,
                    Continuation::ManifestSegment {
                        packets: Vec::new(),
                    },
                )
                .await
            }
            None => {
                let packets = self.find_data_packets_to_download(&manifest_name);
                self.emit(ManagerEvent::ManifestChainComplete {
                    packets: packets.clone(),
                });
                for packet in packets {
                    self.download_data_packet(packet).await?;
                }
                Ok(())
            }
        }
    }

    /// Fetch one data packet, short-circuiting when it is already on
    /// disk.
    pub async fn download_data_packet(&mut self, packet_name: Name) -> Result<()> {
        if self.has_data_packet(&packet_name) {
            self.emit(ManagerEvent::PacketStored { name: packet_name });
            return Ok(());
        }
        self.enqueue(packet_name, Continuation::DataPacket).await
    }

    /// Queue a request unless it is already queued or in flight, then
    /// drain the window.
    async fn enqueue(&mut self, name: Name, continuation: Continuation) -> Result<()> {
        if self.pipeline.contains(&name) || self.queue.contains(&name) {
            return Ok(());
        }
        debug!("queueing request for {}", name);
        self.queue.push(name, continuation);
        self.send_interests().await
    }

    // ---------------------------------------------------------------
    // Next-step discovery
    // ---------------------------------------------------------------

    /// The initial segment name when nothing is held, otherwise the
    /// last held segment's next pointer (absent when the chain is
    /// complete).
    pub fn find_torrent_segment_to_download(&self) -> Option<Name> {
        if self.segments().is_empty() {
            return Some(self.config.torrent_name.clone());
        }
        self.segments()
            .last()
            .and_then(|s| s.next_segment().cloned())
    }

    /// Where to resume the manifest chain containing `manifest_name`:
    /// the requested name when nothing relevant is held, the held
    /// tail's next pointer when the request is already covered.
    pub fn find_manifest_segment_to_download(&self, manifest_name: &Name) -> Option<Name> {
        let prefix = FileManifest::manifest_prefix(manifest_name);
        let held = self
            .manifests()
            .iter()
            .rev()
            .find(|m| prefix.is_prefix_of(m.name()));
        let Some(held) = held else {
            return Some(manifest_name.clone());
        };
        let requested = manifest_name
            .get(-2)
            .and_then(|c| c.to_sequence_number())
            .unwrap_or(0);
        if held.submanifest_number().unwrap_or(0) >= requested {
            held.next_submanifest().cloned()
        } else {
            Some(manifest_name.clone())
        }
    }

    /// For every file named by the torrent catalogs, the next
    /// manifest segment to fetch; fully held files are omitted.
    pub fn find_file_manifests_to_download(&self) -> Vec<Name> {
        let initial: Vec<Name> = self
            .segments()
            .iter()
            .flat_map(|s| s.catalog().iter().cloned())
            .collect();
        initial
            .iter()
            .filter_map(|name| self.find_manifest_segment_to_download(name))
            .collect()
    }

    /// Catalog entries of `manifest_name`'s file whose bits are not
    /// set.
    pub fn find_data_packets_to_download(&self, manifest_name: &Name) -> Vec<Name> {
        let file = FileManifest::manifest_prefix(manifest_name);
        let mut packets = Vec::new();
        for manifest in self.manifests().iter().filter(|m| m.file_name() == file) {
            let state = manifest
                .full_name()
                .ok()
                .and_then(|full| self.file_states.get(&full));
            for (index, packet_name) in manifest.catalog().iter().enumerate() {
                if !state.map_or(false, |s| s.is_set(index)) {
                    packets.push(packet_name.clone());
                }
            }
        }
        packets
    }

    /// Every catalog entry, across all files, whose bit is not set.
    pub fn find_all_missing_data_packets(&self) -> Vec<Name> {
        let mut packets = Vec::new();
        for manifest in self.manifests() {
            let state = manifest
                .full_name()
                .ok()
                .and_then(|full| self.file_states.get(&full));
            for (index, packet_name) in manifest.catalog().iter().enumerate() {
                if !state.map_or(false, |s| s.is_set(index)) {
                    packets.push(packet_name.clone());
                }
            }
        }
        packets
    }

    /// Whether the packet addressed by `name` is durably on disk,
    /// according to the bitmap of the manifest whose name prefixes
    /// it.
    pub fn has_data_packet(&self, name: &Name) -> bool {
        let Some(manifest) = self
            .manifests()
            .iter()
            .find(|m| m.name().is_prefix_of(name))
        else {
            return false;
        };
        let Ok(full) = manifest.full_name() else {
            return false;
        };
        let Some(state) = self.file_states.get(&full) else {
            return false;
        };
        let Some(number) = name.get(-2).and_then(|c| c.to_sequence_number()) else {
            return false;
        };
        state.is_set(number as usize)
    }

    // ---------------------------------------------------------------
    // Completion handlers
    // ---------------------------------------------------------------

    fn verify_delivery(&self, requested: &Name, data: &Data) -> Result<bool> {
        if !data.verify(&self.key_chain) {
            return Ok(false);
        }
        Ok(data.full_name()? == *requested)
    }

    pub(crate) async fn handle_data(&mut self, interest: Interest, data: Data) -> Result<()> {
        let name = interest.name().clone();
        let Some(continuation) = self.pipeline.remove(&name) else {
            warn!("data for unknown request {}", name);
            return Ok(());
        };
        if let Some(peer) = self.cursor.current(&mut self.stats) {
            peer.increment_received_data();
        }
        self.retries = 0;

        if !self.verify_delivery(&name, &data)? {
            warn!("delivered object does not match request {}; refetching", name);
            self.queue.push(name, continuation);
        } else {
            match continuation {
                Continuation::TorrentSegment => self.handle_torrent_segment(data).await?,
                Continuation::ManifestSegment { packets } => {
                    self.handle_manifest_segment(name, data, packets).await?
                }
                Continuation::DataPacket => self.handle_data_packet(data).await?,
            }
        }

        self.send_interests().await?;
        self.check_shutdown();
        Ok(())
    }

    async fn handle_torrent_segment(&mut self, data: Data) -> Result<()> {
        let segment = match TorrentSegment::from_data(&data) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("undecodable torrent segment {}: {}", data.name(), e);
                return Ok(());
            }
        };
        let catalog: Vec<Name> = segment.catalog().to_vec();
        let next = segment.next_segment().cloned();

        self.write_torrent_segment(segment).await?;
        self.emit(ManagerEvent::TorrentSegmentReceived {
            catalog: catalog.clone(),
        });
        for manifest_name in catalog {
            self.download_file_manifest(manifest_name).await?;
        }
        if let Some(next) = next {
            self.enqueue(next, Continuation::TorrentSegment).await?;
        }
        Ok(())
    }

    async fn handle_manifest_segment(
        &mut self,
        request_name: Name,
        data: Data,
        mut packets: Vec<Name>,
    ) -> Result<()> {
        let manifest = match FileManifest::from_data(&data) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("undecodable manifest {}: {}", data.name(), e);
                return Ok(());
            }
        };
        let next = manifest.next_submanifest().cloned();
        let catalog = manifest.catalog().to_vec();

        if !self.write_file_manifest(manifest).await? {
            self.emit(ManagerEvent::RequestFailed {
                name: request_name.clone(),
                reason: "Write Failed".to_string(),
            });
        }

        packets.extend(catalog);
        match next {
            Some(next) => {
                self.enqueue(next, Continuation::ManifestSegment { packets })
                    .await?;
            }
            None => {
                self.emit(ManagerEvent::ManifestChainComplete {
                    packets: packets.clone(),
                });
                // Missing bits cover both the freshly accumulated
                // names and any gaps left by a resumed chain.
                let missing = self.find_data_packets_to_download(&request_name);
                for packet in missing {
                    self.download_data_packet(packet).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_data_packet(&mut self, data: Data) -> Result<()> {
        if self.write_data(&data).await? {
            let full = data.full_name()?;
            self.seed(&full).await?;
        }
        self.emit(ManagerEvent::PacketStored {
            name: data.name().clone(),
        });
        Ok(())
    }

    pub(crate) async fn handle_timeout(&mut self, interest: Interest) -> Result<()> {
        let name = interest.name().clone();
        let Some(continuation) = self.pipeline.remove(&name) else {
            warn!("timeout for unknown request {}", name);
            return Ok(());
        };
        self.retries += 1;
        if self.retries >= self.config.max_retries {
            debug!("{} consecutive timeouts; rotating peer", self.retries);
            self.cursor.advance(&self.stats);
        }
        self.emit(ManagerEvent::RequestFailed {
            name: name.clone(),
            reason: "Unknown error".to_string(),
        });
        // Retry is unbounded per request; rotation does the giving up.
        self.queue.push(name, continuation);
        self.send_interests().await?;
        self.check_shutdown();
        Ok(())
    }

    pub(crate) async fn handle_nack(&mut self, interest: Interest, reason: String) -> Result<()> {
        let name = interest.name().clone();
        if !self.pipeline.contains(&name) {
            warn!("NACK for unknown request {}", name);
            return Ok(());
        }
        debug!("NACK ({}) for {}", reason, name);

        // Rotate only when the refusal came from the selected peer.
        let current = self
            .cursor
            .position(&self.stats)
            .and_then(|index| self.stats.get(index))
            .map(|peer| peer.record_name().clone());
        if interest.forwarding_hint().is_some() && interest.forwarding_hint() == current.as_ref() {
            self.cursor.advance(&self.stats);
        }

        // Re-express the same request with an updated hint; the
        // continuation stays in the pending map.
        let mut retry = Interest::new(name);
        retry.set_lifetime(self.config.interest_lifetime);
        retry.set_must_be_fresh(true);
        if let Some(peer) = self.cursor.current(&mut self.stats) {
            retry.set_forwarding_hint(peer.record_name().clone());
            peer.increment_sent_interests();
        }
        if self.update_handler.needs_update() {
            let probe = self
                .cursor
                .position(&self.stats)
                .and_then(|index| self.stats.get(index))
                .map(|peer| self.update_handler.alive_interest(peer));
            if let Some(probe) = probe {
                self.face.express_interest(probe).await?;
            }
        }
        self.face.express_interest(retry).await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Store mutation
    // ---------------------------------------------------------------

    /// Persist and index a torrent segment: the name must sit under
    /// the torrent prefix, duplicates are rejected, insertion keeps
    /// segment-number order. Returns whether the segment was written.
    pub async fn write_torrent_segment(&mut self, segment: TorrentSegment) -> Result<bool> {
        let Some(torrent_prefix) = TorrentSegment::torrent_file_prefix(&self.config.torrent_name)
        else {
            return Ok(false);
        };
        if !torrent_prefix.is_prefix_of(segment.name()) {
            warn!("segment {} is outside the torrent prefix", segment.name());
            return Ok(false);
        }
        if self.segments.iter().any(|s| *s == segment) {
            return Ok(false);
        }
        store::write_segment(&segment, &self.layout.torrent_files_dir()).await?;
        let full = segment.full_name()?;
        let number = segment.segment_number().unwrap_or(u64::MAX);
        let position = self
            .segments
            .iter()
            .position(|s| number < s.segment_number().unwrap_or(u64::MAX))
            .unwrap_or(self.segments.len());
        self.segments.insert(position, segment);
        self.seed(&full).await?;
        Ok(true)
    }

    /// Persist and index a submanifest: duplicates are rejected,
    /// insertion keeps (file name, submanifest number) order, and
    /// submanifest 0 fixes the file's submanifest size. Returns
    /// whether the manifest was written.
    pub async fn write_file_manifest(&mut self, manifest: FileManifest) -> Result<bool> {
        if self.manifests.iter().any(|m| *m == manifest) {
            return Ok(false);
        }
        if manifest.submanifest_number() == Some(0) {
            self.sub_manifest_sizes
                .insert(manifest.file_name(), manifest.catalog().len() as u64);
        }
        store::write_manifest(&manifest, &self.layout.manifests_dir()).await?;
        let full = manifest.full_name()?;
        let key = (manifest.file_name(), manifest.submanifest_number());
        let position = self
            .manifests
            .iter()
            .position(|m| (m.file_name(), m.submanifest_number()) > key)
            .unwrap_or(self.manifests.len());
        self.manifests.insert(position, manifest);
        self.seed(&full).await?;
        Ok(true)
    }

    /// Write a received packet's bytes to their computed offset and
    /// set its bitmap bit. A set bit means duplicate: nothing is
    /// rewritten and `false` comes back. Write failures leave the bit
    /// clear so the packet is re-requested later.
    pub async fn write_data(&mut self, packet: &Data) -> Result<bool> {
        let packet_name = packet.name().clone();
        let Some(manifest) = self
            .manifests
            .iter()
            .find(|m| m.name().is_prefix_of(&packet_name))
            .cloned()
        else {
            warn!("no manifest owns packet {}", packet_name);
            return Ok(false);
        };
        let full = manifest.full_name()?;

        if !self.file_states.contains_key(&full) {
            let file_path = self.layout.data_file_path(&manifest.file_name());
            if let Some(parent) = file_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            self.file_states
                .insert(full.clone(), FileState::new(manifest.catalog().len()));
        }

        let packet_number = packet_name
            .get(-1)
            .and_then(|c| c.to_sequence_number())
            .ok_or_else(|| {
                EngineError::parse_error(format!("packet name {} has no number", packet_name))
            })? as usize;
        if self
            .file_states
            .get(&full)
            .map_or(false, |state| state.is_set(packet_number))
        {
            return Ok(false);
        }

        let Some(&sub_size) = self.sub_manifest_sizes.get(&manifest.file_name()) else {
            warn!("no submanifest size known for {}", manifest.file_name());
            return Ok(false);
        };
        let file_path = self.layout.data_file_path(&manifest.file_name());
        match packetizer::write_packet(packet, &manifest, sub_size, &file_path).await {
            Ok(()) => {
                if let Some(state) = self.file_states.get_mut(&full) {
                    state.set(packet_number);
                }
                Ok(true)
            }
            Err(e) => {
                error!("write failed for {}: {}", packet.full_name()?, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::{FaceEvent, MemoryFace};
    use crate::manager::ManagerConfig;
    use crate::metadata::KeyChain;
    use crate::storage::StoreLayout;
    use crate::testutil::{build_torrent, script_fixture, TorrentFixture};
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;

    fn config_for(fixture: &TorrentFixture, dir: &TempDir) -> ManagerConfig {
        let mut config = ManagerConfig::new(fixture.torrent_name());
        config.data_dir = dir.path().join("data");
        config.appdata_dir = dir.path().join("appdata");
        config.seed = false;
        config
    }

    fn layout_for(fixture: &TorrentFixture, dir: &TempDir) -> StoreLayout {
        let torrent_id = TorrentSegment::torrent_id(&fixture.torrent_name()).unwrap();
        StoreLayout::new(
            &dir.path().join("appdata"),
            &torrent_id,
            &dir.path().join("data"),
        )
    }

    async fn populate_store(fixture: &TorrentFixture, dir: &TempDir, with_bytes: bool) {
        let layout = layout_for(fixture, dir);
        for segment in &fixture.segments {
            store::write_segment(segment, &layout.torrent_files_dir())
                .await
                .unwrap();
        }
        for manifest in &fixture.manifests {
            store::write_manifest(manifest, &layout.manifests_dir())
                .await
                .unwrap();
        }
        if with_bytes {
            for (file_name, content) in &fixture.files {
                let path = layout.data_file_path(file_name);
                fs::create_dir_all(path.parent().unwrap()).await.unwrap();
                fs::write(&path, content).await.unwrap();
            }
        }
    }

    fn new_manager(
        config: ManagerConfig,
        face: MemoryFace,
        peers: &[&str],
    ) -> (
        TorrentManager<MemoryFace>,
        mpsc::UnboundedReceiver<ManagerEvent>,
    ) {
        let (mut manager, events) = TorrentManager::new(config, face).unwrap();
        for peer in peers {
            manager.add_peer(Name::parse(peer));
        }
        (manager, events)
    }

    fn hint_of(interest: &Interest) -> Name {
        interest.forwarding_hint().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_download_from_empty_store() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"aaaabbbbcc")], 4, 8, 4, &kc);
        let mut face = MemoryFace::new();
        script_fixture(&mut face, &fixture);

        let (mut manager, mut events) =
            new_manager(config_for(&fixture, &dir), face, &["/router/peer1"]);
        manager.initialize().await.unwrap();
        manager.start_download().await.unwrap();
        manager.run().await.unwrap();

        assert!(manager.is_done());
        assert_eq!(manager.segments().len(), 1);
        assert_eq!(manager.manifests().len(), 1);
        for packet in &fixture.packets {
            assert!(manager.has_data_packet(&packet.full_name().unwrap()));
        }
        assert!(manager.find_all_missing_data_packets().is_empty());

        let (file_name, content) = &fixture.files[0];
        let path = layout_for(&fixture, &dir).data_file_path(file_name);
        let on_disk = std::fs::read(path).unwrap();
        assert_eq!(&on_disk, content);

        // One registration per prefix: the torrent chain and the file.
        assert_eq!(manager.face().registered().len(), 2);

        let mut stored = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ManagerEvent::PacketStored { .. }) {
                stored += 1;
            }
        }
        assert_eq!(stored, 3);
    }

    #[tokio::test]
    async fn test_mismatched_segment_is_refetched() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent(
            "demo",
            &[("a.bin", b"aaaa"), ("b.bin", b"bbbb")],
            4,
            8,
            1,
            &kc,
        );
        let decoy = build_torrent("decoy", &[("a.bin", b"zzzz")], 4, 8, 1, &kc);
        assert_eq!(fixture.segments.len(), 2);

        let second_name = fixture.segments[0].next_segment().unwrap().clone();
        let mut face = MemoryFace::new();
        face.queue_data(
            fixture.torrent_name(),
            fixture.segments[0].to_data().unwrap(),
        );
        // The mock answers the second request with a segment whose
        // full name does not match the first segment's next pointer.
        face.queue_data(second_name.clone(), decoy.segments[0].to_data().unwrap());

        let (mut manager, _events) =
            new_manager(config_for(&fixture, &dir), face, &["/router/peer1"]);
        manager.start_download().await.unwrap();
        manager.run().await.unwrap();

        assert_eq!(manager.segments().len(), 1);
        let attempts = manager
            .face()
            .expressed()
            .iter()
            .filter(|i| i.name() == &second_name)
            .count();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_nack_rotates_peer_and_completes_once() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"wxyz")], 4, 8, 4, &kc);
        populate_store(&fixture, &dir, false).await;

        let packet = &fixture.packets[0];
        let request = packet.full_name().unwrap();
        let mut face = MemoryFace::new();
        face.queue_nack(request.clone(), "congestion");
        face.queue_data(request.clone(), packet.clone());

        let (mut manager, _events) = new_manager(
            config_for(&fixture, &dir),
            face,
            &["/router/peer1", "/router/peer2"],
        );
        manager.initialize().await.unwrap();
        manager.download_data_packet(request.clone()).await.unwrap();
        manager.run().await.unwrap();

        assert!(manager.has_data_packet(&request));
        assert_eq!(manager.retries(), 0);
        // The NACK came from peer1, so the retry went to peer2.
        let expressed: Vec<Name> = manager
            .face()
            .expressed()
            .iter()
            .filter(|i| i.name() == &request)
            .map(hint_of)
            .collect();
        assert_eq!(
            expressed,
            vec![Name::parse("/router/peer1"), Name::parse("/router/peer2")]
        );
    }

    #[tokio::test]
    async fn test_timeout_rotation_at_threshold() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"wxyz")], 4, 8, 4, &kc);
        populate_store(&fixture, &dir, false).await;

        let packet = &fixture.packets[0];
        let request = packet.full_name().unwrap();
        let mut face = MemoryFace::new();
        face.queue_timeout(request.clone());
        face.queue_timeout(request.clone());
        face.queue_data(request.clone(), packet.clone());

        let mut config = config_for(&fixture, &dir);
        config.max_retries = 2;
        let (mut manager, _events) =
            new_manager(config, face, &["/router/peer1", "/router/peer2"]);
        manager.initialize().await.unwrap();
        manager.download_data_packet(request.clone()).await.unwrap();
        manager.run().await.unwrap();

        assert!(manager.has_data_packet(&request));
        assert_eq!(manager.retries(), 0);
        // Two timeouts hit the threshold once: the third attempt went
        // to the next peer and succeeded.
        let hints: Vec<Name> = manager
            .face()
            .expressed()
            .iter()
            .filter(|i| i.name() == &request)
            .map(hint_of)
            .collect();
        assert_eq!(
            hints,
            vec![
                Name::parse("/router/peer1"),
                Name::parse("/router/peer1"),
                Name::parse("/router/peer2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_order_packets_fill_bitmap() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"000011112222")], 4, 8, 4, &kc);
        populate_store(&fixture, &dir, false).await;

        let (mut manager, _events) =
            new_manager(config_for(&fixture, &dir), MemoryFace::new(), &["/router/peer1"]);
        manager.initialize().await.unwrap();
        for packet in &fixture.packets {
            manager
                .download_data_packet(packet.full_name().unwrap())
                .await
                .unwrap();
        }
        assert_eq!(manager.pending_len(), 3);

        // Deliveries arrive out of order: 0, then 2, then 1.
        for index in [0usize, 2, 1] {
            let packet = &fixture.packets[index];
            manager.face_mut().push_event(FaceEvent::Data {
                interest: Interest::new(packet.full_name().unwrap()),
                data: packet.clone(),
            });
        }
        manager.run().await.unwrap();

        assert!(manager.is_done());
        for packet in &fixture.packets {
            assert!(manager.has_data_packet(&packet.full_name().unwrap()));
        }
        let (file_name, content) = &fixture.files[0];
        let on_disk =
            std::fs::read(layout_for(&fixture, &dir).data_file_path(file_name)).unwrap();
        assert_eq!(&on_disk, content);
    }

    #[tokio::test]
    async fn test_window_bounds_inflight_requests() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let content = vec![7u8; 40];
        let fixture = build_torrent("demo", &[("file.bin", &content)], 4, 16, 4, &kc);
        populate_store(&fixture, &dir, false).await;
        assert_eq!(fixture.packets.len(), 10);

        let mut config = config_for(&fixture, &dir);
        config.window_size = 4;
        let (mut manager, _events) = new_manager(config, MemoryFace::new(), &["/router/peer1"]);
        manager.initialize().await.unwrap();
        for packet in &fixture.packets {
            manager
                .download_data_packet(packet.full_name().unwrap())
                .await
                .unwrap();
        }

        assert_eq!(manager.pending_len(), 4);
        assert_eq!(manager.queue_len(), 6);
        // Queue order is preserved into the face.
        let expressed: Vec<Name> = manager
            .face()
            .expressed()
            .iter()
            .map(|i| i.name().clone())
            .collect();
        let expected: Vec<Name> = fixture.packets[..4]
            .iter()
            .map(|p| p.full_name().unwrap())
            .collect();
        assert_eq!(expressed, expected);
    }

    #[tokio::test]
    async fn test_duplicate_write_does_not_clobber() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"wxyz")], 4, 8, 4, &kc);
        populate_store(&fixture, &dir, false).await;

        let (mut manager, _events) =
            new_manager(config_for(&fixture, &dir), MemoryFace::new(), &[]);
        manager.initialize().await.unwrap();

        let packet = &fixture.packets[0];
        assert!(manager.write_data(packet).await.unwrap());

        let forged = Data::signed(packet.name().clone(), &b"ZZZZ"[..], &kc);
        assert!(!manager.write_data(&forged).await.unwrap());

        let (file_name, content) = &fixture.files[0];
        let on_disk =
            std::fs::read(layout_for(&fixture, &dir).data_file_path(file_name)).unwrap();
        assert_eq!(&on_disk, content);
    }

    #[tokio::test]
    async fn test_resume_skips_held_packets() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        let fixture = build_torrent("demo", &[("file.bin", b"aaaabbbbcc")], 4, 8, 4, &kc);
        populate_store(&fixture, &dir, true).await;

        let (mut manager, _events) =
            new_manager(config_for(&fixture, &dir), MemoryFace::new(), &["/router/peer1"]);
        manager.initialize().await.unwrap();
        manager.start_download().await.unwrap();

        // Everything is already held: no requests left the face.
        assert!(manager.face().expressed().is_empty());
        assert!(manager.is_done());
    }

    #[tokio::test]
    async fn test_find_manifest_segment_resumes_mid_chain() {
        let dir = tempdir().unwrap();
        let kc = KeyChain::new();
        // Two submanifests of one packet each.
        let fixture = build_torrent("demo", &[("file.bin", b"aaaabbbb")], 4, 1, 4, &kc);
        assert_eq!(fixture.manifests.len(), 2);

        let partial = TorrentFixture {
            segments: fixture.segments.clone(),
            manifests: vec![fixture.manifests[0].clone()],
            packets: Vec::new(),
            files: Vec::new(),
        };
        populate_store(&partial, &dir, false).await;

        let (mut manager, _events) =
            new_manager(config_for(&fixture, &dir), MemoryFace::new(), &[]);
        manager.initialize().await.unwrap();

        let initial = fixture.manifests[0].full_name().unwrap();
        // The held submanifest covers the request, so the next step is
        // its next pointer.
        assert_eq!(
            manager.find_manifest_segment_to_download(&initial),
            Some(fixture.manifests[1].full_name().unwrap())
        );
        // An unknown file starts from the requested name.
        let foreign = Name::parse("/ndn/demo/other.bin")
            .append_sequence(0)
            .append_digest([1u8; 32]);
        assert_eq!(
            manager.find_manifest_segment_to_download(&foreign),
            Some(foreign.clone())
        );
    }
}
