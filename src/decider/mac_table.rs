//! Bounded MAC-learning table (spec §4.H): MAC -> owning peer, with an
//! intrusive per-peer LRU list so a single chatty peer cannot evict another
//! peer's entries. Global size is bounded by `peers.len() * MACS_PER_PEER`.

use crate::peer::PeerId;
use std::collections::{HashMap, VecDeque};

pub type MacAddr = [u8; 6];

pub const MACS_PER_PEER: usize = 16;

#[derive(Default)]
pub struct MacTable {
    owner: HashMap<MacAddr, PeerId>,
    /// Per-peer LRU order, oldest (least recently learned/refreshed) first.
    per_peer: HashMap<PeerId, VecDeque<MacAddr>>,
    cap: usize,
}

impl MacTable {
    pub fn new() -> Self {
        MacTable::with_capacity(MACS_PER_PEER)
    }

    pub fn with_capacity(cap: usize) -> Self {
        MacTable {
            owner: HashMap::new(),
            per_peer: HashMap::new(),
            cap,
        }
    }

    pub fn lookup(&self, mac: &MacAddr) -> Option<PeerId> {
        self.owner.get(mac).copied()
    }

    /// Associates `mac` with `peer`, unless already associated with a
    /// *different* peer — in which case the existing mapping wins and
    /// nothing changes (spec: "if the source MAC is not already associated
    /// with another peer"). Refreshing an existing (mac, peer) pair moves it
    /// to the back of that peer's LRU list. Inserting past `cap` for a peer
    /// evicts that peer's oldest entry.
    pub fn learn(&mut self, mac: MacAddr, peer: PeerId) {
        if let Some(&existing) = self.owner.get(&mac) {
            if existing != peer {
                return;
            }
            let list = self.per_peer.entry(peer).or_default();
            if let Some(pos) = list.iter().position(|m| *m == mac) {
                list.remove(pos);
            }
            list.push_back(mac);
            return;
        }

        let list = self.per_peer.entry(peer).or_default();
        if list.len() >= self.cap {
            if let Some(evicted) = list.pop_front() {
                self.owner.remove(&evicted);
            }
        }
        list.push_back(mac);
        self.owner.insert(mac, peer);
    }

    /// Drops every entry owned by `peer` (used on peer teardown).
    pub fn remove_peer(&mut self, peer: PeerId) {
        if let Some(list) = self.per_peer.remove(&peer) {
            for mac in list {
                self.owner.remove(&mac);
            }
        }
    }
}

pub const BROADCAST_MAC: MacAddr = [0xff; 6];

pub fn is_broadcast(mac: &MacAddr) -> bool {
    *mac == BROADCAST_MAC
}

pub fn is_multicast(mac: &MacAddr) -> bool {
    mac[0] & 0x01 != 0
}
