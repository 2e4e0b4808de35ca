//! File manifests
//!
//! Each file's manifest is a chain of submanifests; submanifest `k`
//! lists the full names of a contiguous range of the file's data
//! packets and points at submanifest `k+1` by full name.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::EngineError;
use crate::metadata::keychain::KeyChain;
use crate::metadata::packet::Data;
use crate::name::Name;

/// One submanifest of a file's manifest chain.
///
/// The name is `<file-prefix>/<submanifest#>`; packets under it are
/// `<file-prefix>/<submanifest#>/<packet#>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    name: Name,
    packet_size: u64,
    catalog: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_submanifest: Option<Name>,
    signature: ByteBuf,
}

#[derive(Serialize, Deserialize)]
struct ManifestBody {
    packet_size: u64,
    catalog: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_submanifest: Option<Name>,
}

impl FileManifest {
    /// Create an unsigned submanifest.
    pub fn new(
        name: Name,
        packet_size: u64,
        catalog: Vec<Name>,
        next_submanifest: Option<Name>,
    ) -> Self {
        FileManifest {
            name,
            packet_size,
            catalog,
            next_submanifest,
            signature: ByteBuf::new(),
        }
    }

    /// The submanifest's name, ending in its submanifest number.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The name prefix identifying the file this submanifest belongs to.
    pub fn file_name(&self) -> Name {
        self.name.parent()
    }

    /// The submanifest number from the trailing name component.
    pub fn submanifest_number(&self) -> Option<u64> {
        self.name.get(-1)?.to_sequence_number()
    }

    /// Size in bytes of each data packet (the last may be short).
    pub fn packet_size(&self) -> u64 {
        self.packet_size
    }

    /// Full names of the data packets in this sub-range.
    pub fn catalog(&self) -> &[Name] {
        &self.catalog
    }

    /// Full name of the next submanifest, absent on the last one.
    pub fn next_submanifest(&self) -> Option<&Name> {
        self.next_submanifest.as_ref()
    }

    /// Attach a signature over the manifest's wire form, so the
    /// signature survives the trip through [`Data`] unchanged.
    pub fn sign(&mut self, key_chain: &KeyChain) -> Result<(), EngineError> {
        let mut data = self.to_data()?;
        data.sign(key_chain);
        self.signature = ByteBuf::from(data.signature().to_vec());
        Ok(())
    }

    /// Check the signature over the manifest's wire form.
    pub fn verify(&self, key_chain: &KeyChain) -> bool {
        self.to_data()
            .map(|data| data.verify(key_chain))
            .unwrap_or(false)
    }

    /// Package the submanifest as a wire object.
    pub fn to_data(&self) -> Result<Data, EngineError> {
        let body = ManifestBody {
            packet_size: self.packet_size,
            catalog: self.catalog.clone(),
            next_submanifest: self.next_submanifest.clone(),
        };
        let content = serde_bencode::to_bytes(&body)?;
        let mut data = Data::new(self.name.clone(), content);
        data.set_signature(self.signature.to_vec());
        Ok(data)
    }

    /// Parse a submanifest out of a received wire object.
    pub fn from_data(data: &Data) -> Result<Self, EngineError> {
        let body: ManifestBody = serde_bencode::from_bytes(data.content())?;
        Ok(FileManifest {
            name: data.name().clone(),
            packet_size: body.packet_size,
            catalog: body.catalog,
            next_submanifest: body.next_submanifest,
            signature: ByteBuf::from(data.signature().to_vec()),
        })
    }

    /// The submanifest's full name (name plus implicit digest).
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

    /// The chain-common prefix (the file name) of a submanifest full
    /// name: the name with its submanifest number and digest removed.
    pub fn manifest_prefix(full_name: &Name) -> Name {
        full_name.prefix(full_name.len().saturating_sub(2))
    }
}
