//! Peer identity.

use std::fmt;

/// Opaque identifier of a peer on one VPN instance, unique within the
/// instance's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u16);

impl PeerId {
    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

impl From<u16> for PeerId {
    fn from(v: u16) -> Self {
        PeerId(v)
    }
}
