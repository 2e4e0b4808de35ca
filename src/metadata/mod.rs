//! Content object metadata
//!
//! The three-tier manifest tree: torrent segments reference file
//! manifests, file manifests reference data packets. All three travel
//! as signed `Data` objects and are told apart by name structure.

pub mod keychain;
pub mod manifest;
pub mod packet;
pub mod segment;

pub use keychain::KeyChain;
pub use manifest::FileManifest;
pub use packet::Data;
pub use segment::{TorrentSegment, TORRENT_FILE_COMPONENT};

use crate::name::{Component, Name};

/// What a full name addresses, inferred from its trailing components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameType {
    /// A segment of the torrent metadata chain
    TorrentFile,
    /// A submanifest of a file's manifest chain
    FileManifest,
    /// A data packet carrying file bytes
    DataPacket,
    /// None of the above
    Unknown,
}

/// Classify a full name by its structure.
///
/// Torrent segments end in `torrent-file/<seg#>/<digest>`, data
/// packets in `<sub#>/<packet#>/<digest>`, submanifests in
/// `<sub#>/<digest>`.
pub fn name_type(name: &Name) -> NameType {
    let marker = Component::from(TORRENT_FILE_COMPONENT);
    if name.get(-3) == Some(&marker) {
        return NameType::TorrentFile;
    }
    let second_last_is_seq = name.get(-2).map_or(false, Component::is_sequence_number);
    let third_last_is_seq = name.get(-3).map_or(false, Component::is_sequence_number);
    match (third_last_is_seq, second_last_is_seq) {
        (true, true) => NameType::DataPacket,
        (false, true) => NameType::FileManifest,
        _ => NameType::Unknown,
    }
}
