//! Byte-oriented analog of [`super::packet_recv::PacketRecv`].
//!
//! The producer may partially satisfy a request: it may call `done` with
//! fewer bytes than `max_len`, and the consumer reissues `recv` for the
//! remainder if it needs more. `done(None)` signals that the underlying
//! stream has ended and no further bytes will ever arrive for this or any
//! later `recv`.

pub type StreamRecvDoneCallback = Box<dyn FnOnce(Option<Vec<u8>>)>;

pub trait StreamRecv {
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Requests up to `max_len` bytes. The producer calls `done` with
    /// `Some(bytes)`, `1..=max_len` of them, or `None` on end-of-stream.
    fn recv(&mut self, max_len: usize, done: StreamRecvDoneCallback);

    fn cancel(&mut self) {}
}
