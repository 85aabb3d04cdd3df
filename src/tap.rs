//! Abstract TAP interface (spec §4.M).
//!
//! The core depends only on an Ethernet-II frame source/sink and an MTU,
//! never on a concrete device. No platform adapter (file descriptors,
//! `ioctl`s, an OS-specific device node, an async `tun`-crate handle — the
//! way the teacher's own `client/device.rs` opens one) lives in this crate;
//! wiring a real TAP device is left to whatever embeds this core.

use crate::flow::packet_pass::PacketPass;
use crate::flow::packet_recv::PacketRecv;

/// Static configuration for a TAP device: just enough for the core (and an
/// embedder's platform adapter) to size buffers and identify the interface.
#[derive(Debug, Clone)]
pub struct TapConfig {
    pub name: String,
    pub mtu: usize,
}

/// Any [`PacketRecv`] source of Ethernet-II frames can serve as a TAP's read
/// side; this is purely a naming bound, no extra capability required.
pub trait TapRecv: PacketRecv {}
impl<T: PacketRecv> TapRecv for T {}

/// Any [`PacketPass`] sink that accepts Ethernet-II frames can serve as a
/// TAP's write side.
pub trait TapSend: PacketPass {}
impl<T: PacketPass> TapSend for T {}
