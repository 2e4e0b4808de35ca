//! Signing and verification
//!
//! SHA-256 based signing over an object's signable byte string. The
//! same primitive produces the implicit digest component of full
//! names.

use sha2::{Digest, Sha256};

use crate::name::{Name, DIGEST_LEN};

/// Compute a SHA-256 digest over `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Append the deterministic signable encoding of `name` to `buf`.
///
/// Component count, then each component as length-prefixed bytes.
pub(crate) fn append_name_bytes(buf: &mut Vec<u8>, name: &Name) {
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    for component in name.components() {
        let bytes = component.as_bytes();
        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(bytes);
    }
}

/// Digest-based signer and verifier for content objects.
#[derive(Debug, Clone, Default)]
pub struct KeyChain;

impl KeyChain {
    /// Create a new key chain.
    pub fn new() -> Self {
        KeyChain
    }

    /// Produce a signature over a signable byte string.
    pub fn sign_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        sha256(bytes).to_vec()
    }

    /// Check a signature over a signable byte string.
    pub fn verify_bytes(&self, bytes: &[u8], signature: &[u8]) -> bool {
        sha256(bytes) == *signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let kc = KeyChain::new();
        let sig = kc.sign_bytes(b"payload");
        assert!(kc.verify_bytes(b"payload", &sig));
        assert!(!kc.verify_bytes(b"tampered", &sig));
    }

    #[test]
    fn test_name_bytes_are_unambiguous() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        append_name_bytes(&mut a, &Name::parse("/ab/c"));
        append_name_bytes(&mut b, &Name::parse("/a/bc"));
        assert_ne!(a, b);
    }
}
