//! IGMP-snooped multicast group membership (spec §4.H): for each (group,
//! peer) pair we track an expiration deadline, refreshed by membership
//! reports and shortened by group-specific queries. Expiry is lazy:
//! entries past their deadline are simply skipped by `members`, not proactively
//! swept, since nothing downstream needs to observe the sweep itself.

use crate::peer::PeerId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// IGMPv2 default unsolicited group-membership-report interval; a
/// membership entry not refreshed within this window is stale.
pub const IGMP_GROUP_MEMBERSHIP_INTERVAL: Duration = Duration::from_secs(260);

/// Window after a Group-Specific Query within which a member must respond,
/// else it is dropped.
pub const IGMP_LAST_MEMBER_QUERY_TIME: Duration = Duration::from_secs(2);

pub const PEER_MAX_GROUPS: usize = 16;

#[derive(Default)]
pub struct MulticastTable {
    groups: HashMap<Ipv4Addr, HashMap<PeerId, Instant>>,
}

impl MulticastTable {
    pub fn new() -> Self {
        MulticastTable::default()
    }

    /// Records an IGMP membership report: `peer` belongs to `group` until
    /// `now + IGMP_GROUP_MEMBERSHIP_INTERVAL`. Silently caps the number of
    /// distinct groups a single peer may join to `PEER_MAX_GROUPS` by
    /// ignoring reports past the cap (new joins do not evict older ones;
    /// a peer that wants a new group must let one expire first).
    pub fn report(&mut self, group: Ipv4Addr, peer: PeerId, now: Instant) {
        let already_member = self.groups.get(&group).is_some_and(|m| m.contains_key(&peer));
        if !already_member && self.peer_group_count(peer) >= PEER_MAX_GROUPS {
            return;
        }
        self.groups
            .entry(group)
            .or_default()
            .insert(peer, now + IGMP_GROUP_MEMBERSHIP_INTERVAL);
    }

    fn peer_group_count(&self, peer: PeerId) -> usize {
        self.groups.values().filter(|m| m.contains_key(&peer)).count()
    }

    /// A Group-Specific Query shortens every member's deadline for `group`
    /// to `now + IGMP_LAST_MEMBER_QUERY_TIME` (members that don't answer
    /// with a fresh report before then drop out of the group).
    pub fn group_specific_query(&mut self, group: Ipv4Addr, now: Instant) {
        if let Some(members) = self.groups.get_mut(&group) {
            for deadline in members.values_mut() {
                let shortened = now + IGMP_LAST_MEMBER_QUERY_TIME;
                if shortened < *deadline {
                    *deadline = shortened;
                }
            }
        }
    }

    /// Peers currently (as of `now`) members of `group`.
    pub fn members(&self, group: Ipv4Addr, now: Instant) -> Vec<PeerId> {
        self.groups
            .get(&group)
            .into_iter()
            .flat_map(|m| m.iter())
            .filter(|(_, deadline)| **deadline > now)
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub fn remove_peer(&mut self, peer: PeerId) {
        for members in self.groups.values_mut() {
            members.remove(&peer);
        }
        self.groups.retain(|_, members| !members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_member_is_visible_until_it_expires() {
        let mut table = MulticastTable::new();
        let now = Instant::now();
        let group = Ipv4Addr::new(239, 1, 2, 3);
        table.report(group, PeerId(1), now);

        assert_eq!(table.members(group, now), vec![PeerId(1)]);
        assert!(table
            .members(group, now + IGMP_GROUP_MEMBERSHIP_INTERVAL + Duration::from_secs(1))
            .is_empty());
    }

    #[test]
    fn group_specific_query_shortens_but_never_lengthens_deadline() {
        let mut table = MulticastTable::new();
        let now = Instant::now();
        let group = Ipv4Addr::new(239, 1, 2, 3);
        table.report(group, PeerId(1), now);

        table.group_specific_query(group, now);
        assert!(table.members(group, now + IGMP_LAST_MEMBER_QUERY_TIME + Duration::from_millis(1)).is_empty());

        // A later, unrelated query must not push the deadline back out.
        table.report(group, PeerId(2), now);
        table.group_specific_query(group, now);
        let far_future = now + IGMP_GROUP_MEMBERSHIP_INTERVAL;
        assert!(!table.members(group, far_future).contains(&PeerId(2)));
    }

    #[test]
    fn remove_peer_clears_all_of_its_memberships() {
        let mut table = MulticastTable::new();
        let now = Instant::now();
        let group = Ipv4Addr::new(239, 1, 2, 3);
        table.report(group, PeerId(1), now);
        table.remove_peer(PeerId(1));
        assert!(table.members(group, now).is_empty());
    }
}
