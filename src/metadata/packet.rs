//! Signed content objects
//!
//! `Data` is the universal wire object: a name, a content payload,
//! and a signature. Torrent segments and file manifests travel as
//! `Data` whose content carries their record body; data packets carry
//! raw file bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::EngineError;
use crate::metadata::keychain::{append_name_bytes, sha256, KeyChain};
use crate::name::Name;

/// A signed content object answering a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    name: Name,
    content: Bytes,
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct DataWire {
    name: Name,
    content: ByteBuf,
    signature: ByteBuf,
}

impl Data {
    /// Create an unsigned content object.
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Data {
            name,
            content: content.into(),
            signature: Vec::new(),
        }
    }

    /// The object's name (without the implicit digest).
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The content payload.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Install a signature produced elsewhere.
    pub fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn signable(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.content.len() + 64);
        append_name_bytes(&mut buf, &self.name);
        buf.extend_from_slice(&self.content);
        buf
    }

    /// Attach a signature over the name and content.
    pub fn sign(&mut self, key_chain: &KeyChain) {
        self.signature = key_chain.sign_bytes(&self.signable());
    }

    /// Check the signature over the name and content.
    pub fn verify(&self, key_chain: &KeyChain) -> bool {
        key_chain.verify_bytes(&self.signable(), &self.signature)
    }

    /// Encode for transmission or disk.
    pub fn wire_encode(&self) -> Result<Vec<u8>, EngineError> {
        let wire = DataWire {
            name: self.name.clone(),
            content: ByteBuf::from(self.content.to_vec()),
            signature: ByteBuf::from(self.signature.clone()),
        };
        Ok(serde_bencode::to_bytes(&wire)?)
    }

    /// Decode from wire or disk bytes.
    pub fn wire_decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let wire: DataWire = serde_bencode::from_bytes(bytes)?;
        Ok(Data {
            name: wire.name,
            content: Bytes::from(wire.content.into_vec()),
            signature: wire.signature.into_vec(),
        })
    }

    /// The full name: the name extended with the implicit digest over
    /// the wire encoding. Full-name equality is content identity.
    pub fn full_name(&self) -> Result<Name, EngineError> {
        let wire = self.wire_encode()?;
        Ok(self.name.clone().append_digest(sha256(&wire)))
    }

    /// Construct a signed packet in one step.
    pub fn signed(name: Name, content: impl Into<Bytes>, key_chain: &KeyChain) -> Self {
        let mut data = Data::new(name, content);
        data.sign(key_chain);
        data
    }
}
