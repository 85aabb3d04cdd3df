//! Byte-oriented analog of [`super::packet_pass::PacketPass`].
//!
//! The producer may partially satisfy a call: `done(n)` with `n` less than
//! the data length, in which case the consumer reissues with the
//! unconsumed remainder.

pub type StreamDoneCallback = Box<dyn FnOnce(usize)>;

pub trait StreamPass {
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Offers `data` to the consumer. The consumer calls `done(n)` with the
    /// number of bytes it accepted, `0 < n <= data.len()`.
    fn send(&mut self, data: Vec<u8>, done: StreamDoneCallback);

    fn cancel(&mut self) {}
}
