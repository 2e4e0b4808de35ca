//! Face (transport) abstraction
//!
//! The face carries Interests out and delivers completions back:
//! data, timeout, or NACK for outstanding requests, plus inbound
//! interests under registered prefixes and registration failures.
//! The wire transport itself lives behind the [`Face`] trait;
//! [`MemoryFace`] is the in-process implementation.

pub mod memory;

pub use memory::MemoryFace;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::metadata::Data;
use crate::name::Name;

/// An outbound pull request for a name; at most one Data answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    name: Name,
    lifetime: Duration,
    must_be_fresh: bool,
    forwarding_hint: Option<Name>,
}

impl Interest {
    /// Create an interest with default lifetime and no hint.
    pub fn new(name: Name) -> Self {
        Interest {
            name,
            lifetime: Duration::from_secs(2),
            must_be_fresh: false,
            forwarding_hint: None,
        }
    }

    /// The requested name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// How long the face keeps the request outstanding.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Set the request lifetime.
    pub fn set_lifetime(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
    }

    /// Whether cached stale content may answer this request.
    pub fn must_be_fresh(&self) -> bool {
        self.must_be_fresh
    }

    /// Require fresh content.
    pub fn set_must_be_fresh(&mut self, fresh: bool) {
        self.must_be_fresh = fresh;
    }

    /// The routable name steering this request toward a peer.
    pub fn forwarding_hint(&self) -> Option<&Name> {
        self.forwarding_hint.as_ref()
    }

    /// Attach a forwarding hint.
    pub fn set_forwarding_hint(&mut self, hint: Name) {
        self.forwarding_hint = Some(hint);
    }
}

/// A completion or inbound event delivered by the face.
#[derive(Debug, Clone)]
pub enum FaceEvent {
    /// A Data object arrived for an outstanding request.
    Data { interest: Interest, data: Data },
    /// An outstanding request expired unanswered.
    Timeout { interest: Interest },
    /// The network refused an outstanding request.
    Nack { interest: Interest, reason: String },
    /// An inbound request arrived under a registered prefix.
    InterestReceived { interest: Interest },
    /// A prefix registration was refused.
    RegisterFailed { prefix: Name, reason: String },
}

/// The transport consumed by the manager.
///
/// One event loop drives the face; all events are serviced serially
/// through [`Face::next_event`].
#[async_trait]
pub trait Face: Send {
    /// Send a one-shot outbound request.
    async fn express_interest(&mut self, interest: Interest) -> Result<()>;

    /// Transmit a locally produced content object in reply to an
    /// inbound interest.
    async fn put(&mut self, data: Data) -> Result<()>;

    /// Register to serve any request under `prefix`. Failures are
    /// reported through [`FaceEvent::RegisterFailed`].
    async fn register_prefix(&mut self, prefix: Name) -> Result<()>;

    /// The next pending event, or `None` when the face has shut down.
    async fn next_event(&mut self) -> Option<FaceEvent>;
}
