//! FrameDecider (spec §4.H): decides, for an Ethernet frame bound for the
//! network, which peers it must be transmitted to; and, for a frame arriving
//! from a peer, what that teaches the MAC table and multicast table.

use super::mac_table::{self, MacAddr, MacTable};
use super::multicast_table::MulticastTable;
use crate::peer::PeerId;
use std::net::Ipv4Addr;
use std::time::Instant;

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IP_PROTO_IGMP: u8 = 2;
const IGMP_V2_MEMBERSHIP_REPORT: u8 = 0x16;
const IGMP_V3_MEMBERSHIP_REPORT: u8 = 0x22;
const IGMP_MEMBERSHIP_QUERY: u8 = 0x11;

pub struct FrameDeciderConfig {
    pub mac_table_cap: usize,
}

impl Default for FrameDeciderConfig {
    fn default() -> Self {
        FrameDeciderConfig {
            mac_table_cap: mac_table::MACS_PER_PEER,
        }
    }
}

pub struct FrameDecider {
    mac_table: MacTable,
    multicast_table: MulticastTable,
}

impl FrameDecider {
    pub fn new(config: FrameDeciderConfig) -> Self {
        FrameDecider {
            mac_table: MacTable::with_capacity(config.mac_table_cap),
            multicast_table: MulticastTable::new(),
        }
    }

    /// Dispatch decision for an outbound frame headed to the network.
    /// `peers` is the full set of currently-known remote peers; never
    /// fails — frames this decider cannot classify degrade to flood.
    pub fn decide(&self, frame: &[u8], peers: &[PeerId], now: Instant) -> Vec<PeerId> {
        let Some(dest_mac) = dest_mac(frame) else {
            return peers.to_vec();
        };

        if mac_table::is_broadcast(&dest_mac) {
            return peers.to_vec();
        }

        if mac_table::is_multicast(&dest_mac) {
            if let Some(group) = ipv4_dest_addr(frame) {
                let members = self.multicast_table.members(group, now);
                if !members.is_empty() {
                    return members;
                }
            }
            return peers.to_vec();
        }

        match self.mac_table.lookup(&dest_mac) {
            Some(peer) => vec![peer],
            None => peers.to_vec(),
        }
    }

    /// Updates the MAC table (and multicast table, if the frame carries an
    /// IGMP report or query) from a frame just received from `from`.
    pub fn on_frame_received(&mut self, frame: &[u8], from: PeerId, now: Instant) {
        if let Some(src) = src_mac(frame) {
            if !mac_table::is_multicast(&src) {
                self.mac_table.learn(src, from);
            }
        }
        self.snoop_igmp(frame, from, now);
    }

    fn snoop_igmp(&mut self, frame: &[u8], from: PeerId, now: Instant) {
        let Some((proto, ip_payload)) = ipv4_protocol_and_payload(frame) else {
            return;
        };
        if proto != IP_PROTO_IGMP || ip_payload.len() < 8 {
            return;
        }
        let igmp_type = ip_payload[0];
        let group = Ipv4Addr::new(ip_payload[4], ip_payload[5], ip_payload[6], ip_payload[7]);
        match igmp_type {
            IGMP_V2_MEMBERSHIP_REPORT | IGMP_V3_MEMBERSHIP_REPORT => {
                self.multicast_table.report(group, from, now);
            }
            IGMP_MEMBERSHIP_QUERY if group != Ipv4Addr::UNSPECIFIED => {
                self.multicast_table.group_specific_query(group, now);
            }
            _ => {}
        }
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        self.mac_table.remove_peer(peer);
        self.multicast_table.remove_peer(peer);
    }
}

fn dest_mac(frame: &[u8]) -> Option<MacAddr> {
    frame.get(0..6)?.try_into().ok()
}

fn src_mac(frame: &[u8]) -> Option<MacAddr> {
    frame.get(6..12)?.try_into().ok()
}

fn ethertype(frame: &[u8]) -> Option<u16> {
    let bytes = frame.get(12..14)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn ipv4_header(frame: &[u8]) -> Option<&[u8]> {
    if ethertype(frame)? != ETHERTYPE_IPV4 {
        return None;
    }
    frame.get(ETHERNET_HEADER_LEN..)
}

fn ipv4_dest_addr(frame: &[u8]) -> Option<Ipv4Addr> {
    let ip = ipv4_header(frame)?;
    let bytes = ip.get(16..20)?;
    Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

fn ipv4_protocol_and_payload(frame: &[u8]) -> Option<(u8, &[u8])> {
    let ip = ipv4_header(frame)?;
    let ihl = (*ip.first()? & 0x0f) as usize * 4;
    let proto = *ip.get(9)?;
    Some((proto, ip.get(ihl..)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_frame(dest: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&dest);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn unknown_unicast_destination_floods() {
        let decider = FrameDecider::new(FrameDeciderConfig::default());
        let peers = vec![PeerId(1), PeerId(2)];
        let now = Instant::now();
        let frame = eth_frame([9; 6], [1; 6], 0x0806, &[]);
        assert_eq!(decider.decide(&frame, &peers, now), peers);
    }

    #[test]
    fn learning_then_unicast_resolves_to_single_peer() {
        let mut decider = FrameDecider::new(FrameDeciderConfig::default());
        let peers = vec![PeerId(1), PeerId(2)];
        let now = Instant::now();

        let from_a = eth_frame(mac_table::BROADCAST_MAC, [0x02, 0x11, 0x22, 0x33, 0x44, 0x55], 0x0806, &[]);
        decider.on_frame_received(&from_a, PeerId(1), now);

        let to_learned = eth_frame([0x02, 0x11, 0x22, 0x33, 0x44, 0x55], [9; 6], 0x0806, &[]);
        assert_eq!(decider.decide(&to_learned, &peers, now), vec![PeerId(1)]);
    }

    #[test]
    fn broadcast_always_floods() {
        let decider = FrameDecider::new(FrameDeciderConfig::default());
        let peers = vec![PeerId(1), PeerId(2), PeerId(3)];
        let frame = eth_frame(mac_table::BROADCAST_MAC, [1; 6], 0x0806, &[]);
        assert_eq!(decider.decide(&frame, &peers, Instant::now()), peers);
    }

    #[test]
    fn unknown_multicast_group_degrades_to_flood() {
        let decider = FrameDecider::new(FrameDeciderConfig::default());
        let peers = vec![PeerId(1), PeerId(2)];
        // Multicast MAC (first octet LSB set), IPv4 destined to 239.1.2.3.
        let ip = vec![0x45, 0, 0, 28, 0, 0, 0, 0, 64, 6, 0, 0, 10, 0, 0, 1, 239, 1, 2, 3];
        let frame = eth_frame([0x01, 0, 0x5e, 1, 2, 3], [1; 6], 0x0800, &ip);
        assert_eq!(decider.decide(&frame, &peers, Instant::now()), peers);
    }

    #[test]
    fn igmp_report_then_multicast_dispatch_resolves_to_members() {
        let mut decider = FrameDecider::new(FrameDeciderConfig::default());
        let peers = vec![PeerId(1), PeerId(2)];
        let now = Instant::now();

        // IP header (20 bytes, proto=IGMP=2) + IGMP v2 membership report for 239.1.2.3.
        let mut ip = vec![0x45, 0, 0, 28, 0, 0, 0, 0, 64, IP_PROTO_IGMP, 0, 0, 10, 0, 0, 2, 239, 1, 2, 3];
        let igmp = vec![IGMP_V2_MEMBERSHIP_REPORT, 0, 0, 0, 239, 1, 2, 3];
        ip.extend_from_slice(&igmp);
        let report_frame = eth_frame(mac_table::BROADCAST_MAC, [3; 6], 0x0800, &ip);
        decider.on_frame_received(&report_frame, PeerId(1), now);

        let data_ip = vec![0x45, 0, 0, 28, 0, 0, 0, 0, 64, 6, 0, 0, 10, 0, 0, 1, 239, 1, 2, 3];
        let data_frame = eth_frame([0x01, 0, 0x5e, 1, 2, 3], [1; 6], 0x0800, &data_ip);
        assert_eq!(decider.decide(&data_frame, &peers, now), vec![PeerId(1)]);
    }
}
