//! Hierarchical content names
//!
//! Names address content rather than hosts: an ordered sequence of
//! byte-string components supporting prefix comparison and
//! sequence-number components. A *full name* is a name extended with
//! an implicit SHA-256 digest component over the wire encoding of the
//! object it labels; full-name equality is content identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker byte prefixing a sequence-number component.
const SEQUENCE_MARKER: u8 = 0xFE;

/// Length of an implicit digest component (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// A single name component: an opaque byte string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component(#[serde(with = "serde_bytes")] Vec<u8>);

impl Component {
    /// Create a component from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Component(bytes.into())
    }

    /// Create a sequence-number component.
    pub fn sequence_number(value: u64) -> Self {
        let mut bytes = Vec::with_capacity(9);
        bytes.push(SEQUENCE_MARKER);
        bytes.extend_from_slice(&value.to_be_bytes());
        Component(bytes)
    }

    /// Create an implicit digest component from a SHA-256 digest.
    pub fn digest(digest: [u8; DIGEST_LEN]) -> Self {
        Component(digest.to_vec())
    }

    /// Whether this component encodes a sequence number.
    pub fn is_sequence_number(&self) -> bool {
        self.0.len() == 9 && self.0[0] == SEQUENCE_MARKER
    }

    /// Interpret this component as a sequence number.
    pub fn to_sequence_number(&self) -> Option<u64> {
        if !self.is_sequence_number() {
            return None;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[1..]);
        Some(u64::from_be_bytes(buf))
    }

    /// Whether this component has the shape of an implicit digest.
    pub fn is_digest(&self) -> bool {
        self.0.len() == DIGEST_LEN
    }

    /// The raw component bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(seq) = self.to_sequence_number() {
            return write!(f, "seq={}", seq);
        }
        if self.0.iter().all(|b| b.is_ascii_graphic()) && !self.0.is_empty() {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "{}", hex::encode(&self.0))
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A hierarchical content name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// Create an empty name.
    pub fn new() -> Self {
        Name::default()
    }

    /// Parse a name from a `/`-separated URI string.
    pub fn parse(uri: &str) -> Self {
        let components = uri
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Component::from)
            .collect();
        Name { components }
    }

    /// Append a component, returning the extended name.
    pub fn append(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Append a string component, returning the extended name.
    pub fn append_str(self, s: &str) -> Self {
        self.append(Component::from(s))
    }

    /// Append a sequence-number component, returning the extended name.
    pub fn append_sequence(self, value: u64) -> Self {
        self.append(Component::sequence_number(value))
    }

    /// Append an implicit digest component, returning the full name.
    pub fn append_digest(self, digest: [u8; DIGEST_LEN]) -> Self {
        self.append(Component::digest(digest))
    }

    /// Push a component in place.
    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component at `index`; negative indices count from the end.
    pub fn get(&self, index: isize) -> Option<&Component> {
        let len = self.components.len() as isize;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            return None;
        }
        self.components.get(resolved as usize)
    }

    /// A contiguous sub-name of `count` components starting at `start`.
    pub fn sub_name(&self, start: usize, count: usize) -> Name {
        let end = (start + count).min(self.components.len());
        let start = start.min(end);
        Name {
            components: self.components[start..end].to_vec(),
        }
    }

    /// The first `count` components.
    pub fn prefix(&self, count: usize) -> Name {
        self.sub_name(0, count)
    }

    /// The name with its last component removed.
    pub fn parent(&self) -> Name {
        self.prefix(self.components.len().saturating_sub(1))
    }

    /// Whether this name is a prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        if self.components.len() > other.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// Iterate over the components.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
