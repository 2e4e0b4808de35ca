//! Torrent metadata segments
//!
//! The torrent metadata is a chain of segments. Each segment lists
//! the first-submanifest full names of the files it covers and points
//! at the next segment by full name, binding order and authorship.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::EngineError;
use crate::metadata::keychain::KeyChain;
use crate::metadata::packet::Data;
use crate::name::{Component, Name};

/// Name component introducing the torrent metadata chain.
pub const TORRENT_FILE_COMPONENT: &str = "torrent-file";

/// One segment of the torrent metadata chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentSegment {
    name: Name,
    catalog: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_segment: Option<Name>,
    signature: ByteBuf,
}

#[derive(Serialize, Deserialize)]
struct SegmentBody {
    catalog: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_segment: Option<Name>,
}

impl TorrentSegment {
    /// Create an unsigned segment.
    pub fn new(name: Name, catalog: Vec<Name>, next_segment: Option<Name>) -> Self {
        TorrentSegment {
            name,
            catalog,
            next_segment,
            signature: ByteBuf::new(),
        }
    }

    /// The segment's name, ending in its segment number.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// First-submanifest full names of the files this segment covers.
    pub fn catalog(&self) -> &[Name] {
        &self.catalog
    }

    /// Full name of the next segment, absent on the terminal segment.
    pub fn next_segment(&self) -> Option<&Name> {
        self.next_segment.as_ref()
    }

    /// The segment number from the trailing name component.
    pub fn segment_number(&self) -> Option<u64> {
        self.name.get(-1)?.to_sequence_number()
    }

    /// Attach a signature over the segment's wire form, so the
    /// signature survives the trip through [`Data`] unchanged.
    pub fn sign(&mut self, key_chain: &KeyChain) -> Result<(), EngineError> {
        let mut data = self.to_data()?;
        data.sign(key_chain);
        self.signature = ByteBuf::from(data.signature().to_vec());
        Ok(())
    }

    /// Check the signature over the segment's wire form.
    pub fn verify(&self, key_chain: &KeyChain) -> bool {
        self.to_data()
            .map(|data| data.verify(key_chain))
            .unwrap_or(false)
    }

    /// Package the segment as a wire object.
    pub fn to_data(&self) -> Result<Data, EngineError> {
        let body = SegmentBody {
            catalog: self.catalog.clone(),
            next_segment: self.next_segment.clone(),
        };
        let content = serde_bencode::to_bytes(&body)?;
        let mut data = Data::new(self.name.clone(), content);
        data.set_signature(self.signature.to_vec());
        Ok(data)
    }

    /// Parse a segment out of a received wire object.
    pub fn from_data(data: &Data) -> Result<Self, EngineError> {
        let body: SegmentBody = serde_bencode::from_bytes(data.content())?;
        Ok(TorrentSegment {
            name: data.name().clone(),
            catalog: body.catalog,
            next_segment: body.next_segment,
            signature: ByteBuf::from(data.signature().to_vec()),
        })
    }

    /// The segment's full name (name plus implicit digest).
    pub fn full_name(&self) -> Result<Name, EngineError> {
        self.to_data()?.full_name()
    }

    /// Encode the on-disk record.
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    /// Decode an on-disk record.
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        Ok(serde_bencode::from_bytes(bytes)?)
    }

    /// The chain-common prefix of a segment name or full name: the
    /// name truncated just past its `torrent-file` component.
    pub fn torrent_file_prefix(name: &Name) -> Option<Name> {
        let marker = Component::from(TORRENT_FILE_COMPONENT);
        let position = name.components().position(|c| *c == marker)?;
        Some(name.prefix(position + 1))
    }

    /// The torrent identifier: the component preceding `torrent-file`.
    pub fn torrent_id(name: &Name) -> Option<String> {
        let prefix = Self::torrent_file_prefix(name)?;
        let id = prefix.get(-2)?;
        Some(String::from_utf8_lossy(id.as_bytes()).into_owned())
    }
}
