//! Frame decider (spec §4.H): MAC learning plus IGMP snooping, used to pick
//! which peers an outbound Ethernet frame should be forwarded to.

pub mod frame_decider;
pub mod mac_table;
pub mod multicast_table;

pub use frame_decider::{FrameDecider, FrameDeciderConfig};
