//! Peer liveness probes
//!
//! At rotation boundaries the manager may emit an ALIVE probe so
//! other peers learn this node's routable prefix is still serving.

use crate::face::Interest;
use crate::name::Name;
use crate::peers::PeerRecord;

/// Name component marking a liveness probe.
pub const ALIVE_COMPONENT: &str = "ALIVE";

/// Builds ALIVE probes and tracks when one is due.
#[derive(Debug, Clone)]
pub struct UpdateHandler {
    torrent_name: Name,
    own_routable_prefix: Name,
    probe_due: bool,
}

impl UpdateHandler {
    /// Create a handler announcing `own_routable_prefix` for the
    /// torrent identified by `torrent_name`.
    pub fn new(torrent_name: Name, own_routable_prefix: Name) -> Self {
        UpdateHandler {
            torrent_name,
            own_routable_prefix,
            probe_due: true,
        }
    }

    /// This node's routable prefix; empty when none is configured.
    pub fn own_routable_prefix(&self) -> &Name {
        &self.own_routable_prefix
    }

    /// Whether an ALIVE probe should be sent at the next rotation
    /// boundary.
    pub fn needs_update(&self) -> bool {
        self.probe_due && !self.own_routable_prefix.is_empty()
    }

    /// Mark that the peer set changed and a probe is due again.
    pub fn mark_dirty(&mut self) {
        self.probe_due = true;
    }

    /// Build an ALIVE probe steered toward `peer`, consuming the due
    /// flag.
    pub fn alive_interest(&mut self, peer: &PeerRecord) -> Interest {
        self.probe_due = false;
        let mut name = peer.record_name().clone();
        for component in self.torrent_name.components() {
            name.push(component.clone());
        }
        name = name.append_str(ALIVE_COMPONENT);
        for component in self.own_routable_prefix.components() {
            name.push(component.clone());
        }
        let mut interest = Interest::new(name);
        interest.set_must_be_fresh(true);
        interest
    }
}
