//! `PacketRecvInterface`: the pull-model flow interface, consumer to
//! producer (spec §4.D).
//!
//! The consumer calls [`PacketRecv::recv`]; the producer must call the
//! supplied `done` callback exactly once with the received packet, either
//! synchronously or later. Cancel semantics are symmetric with
//! [`super::packet_pass::PacketPass`].

/// Invoked by the producer with the packet it produced for an outstanding
/// `recv` call.
pub type RecvDoneCallback = Box<dyn FnOnce(Vec<u8>)>;

pub trait PacketRecv {
    /// Maximum packet size this source will ever produce.
    fn mtu(&self) -> usize;

    /// True if `cancel` is a supported operation on this source.
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Requests a packet. The producer must eventually call `done` exactly
    /// once with a packet of length `<= mtu()`.
    fn recv(&mut self, done: RecvDoneCallback);

    /// Aborts an outstanding `recv`. Only valid when `supports_cancel()` is
    /// true and a `recv` is currently outstanding.
    fn cancel(&mut self) {}
}
