//! Shared fixtures for the test suite: builds complete, correctly
//! chained torrents (segments, manifests, signed packets) in memory.

use crate::face::MemoryFace;
use crate::metadata::{Data, FileManifest, KeyChain, TorrentSegment, TORRENT_FILE_COMPONENT};
use crate::name::Name;

/// A fully built torrent: chained segments, chained manifests per
/// file, signed packets, and the original file bytes.
pub struct TorrentFixture {
    pub segments: Vec<TorrentSegment>,
    pub manifests: Vec<FileManifest>,
    pub packets: Vec<Data>,
    pub files: Vec<(Name, Vec<u8>)>,
}

impl TorrentFixture {
    /// Full name of the initial torrent segment.
    pub fn torrent_name(&self) -> Name {
        self.segments[0].full_name().unwrap()
    }
}

/// Build a torrent under `/ndn/<torrent_id>` from `files` (relative
/// path, content), cutting packets of `packet_size` bytes grouped
/// into submanifests of `submanifest_size` packets, and splitting the
/// catalog across segments of `manifests_per_segment` entries.
pub fn build_torrent(
    torrent_id: &str,
    files: &[(&str, &[u8])],
    packet_size: u64,
    submanifest_size: u64,
    manifests_per_segment: usize,
    key_chain: &KeyChain,
) -> TorrentFixture {
    let base = Name::parse("/ndn").append_str(torrent_id);

    let mut all_manifests = Vec::new();
    let mut all_packets = Vec::new();
    let mut initial_names = Vec::new();
    let mut file_entries = Vec::new();

    for (relative, content) in files {
        let mut file_name = base.clone();
        for component in Name::parse(relative).components() {
            file_name.push(component.clone());
        }

        let chunks: Vec<&[u8]> = content.chunks(packet_size as usize).collect();
        let groups: Vec<&[&[u8]]> = chunks.chunks(submanifest_size as usize).collect();

        let mut manifests_rev: Vec<FileManifest> = Vec::new();
        let mut packets_rev: Vec<Vec<Data>> = Vec::new();
        let mut next: Option<Name> = None;
        for (sub_index, group) in groups.iter().enumerate().rev() {
            let manifest_name = file_name.clone().append_sequence(sub_index as u64);
            let mut catalog = Vec::new();
            let mut sub_packets = Vec::new();
            for (packet_index, chunk) in group.iter().enumerate() {
                let packet = Data::signed(
                    manifest_name.clone().append_sequence(packet_index as u64),
                    chunk.to_vec(),
                    key_chain,
                );
                catalog.push(packet.full_name().unwrap());
                sub_packets.push(packet);
            }
            let mut manifest =
                FileManifest::new(manifest_name, packet_size, catalog, next.take());
            manifest.sign(key_chain).unwrap();
            next = Some(manifest.full_name().unwrap());
            manifests_rev.push(manifest);
            packets_rev.push(sub_packets);
        }
        manifests_rev.reverse();
        packets_rev.reverse();

        initial_names.push(manifests_rev[0].full_name().unwrap());
        all_manifests.extend(manifests_rev);
        all_packets.extend(packets_rev.into_iter().flatten());
        file_entries.push((file_name, content.to_vec()));
    }

    let mut catalogs: Vec<Vec<Name>> = initial_names
        .chunks(manifests_per_segment)
        .map(|c| c.to_vec())
        .collect();
    if catalogs.is_empty() {
        catalogs.push(Vec::new());
    }

    let mut segments_rev = Vec::new();
    let mut next: Option<Name> = None;
    for (index, catalog) in catalogs.iter().enumerate().rev() {
        let name = base
            .clone()
            .append_str(TORRENT_FILE_COMPONENT)
            .append_sequence(index as u64);
        let mut segment = TorrentSegment::new(name, catalog.clone(), next.take());
        segment.sign(key_chain).unwrap();
        next = Some(segment.full_name().unwrap());
        segments_rev.push(segment);
    }
    segments_rev.reverse();

    TorrentFixture {
        segments: segments_rev,
        manifests: all_manifests,
        packets: all_packets,
        files: file_entries,
    }
}

/// Script `face` to answer every request of the fixture with the
/// right object.
pub fn script_fixture(face: &mut MemoryFace, fixture: &TorrentFixture) {
    for segment in &fixture.segments {
        face.queue_data(segment.full_name().unwrap(), segment.to_data().unwrap());
    }
    for manifest in &fixture.manifests {
        face.queue_data(manifest.full_name().unwrap(), manifest.to_data().unwrap());
    }
    for packet in &fixture.packets {
        face.queue_data(packet.full_name().unwrap(), packet.clone());
    }
}
