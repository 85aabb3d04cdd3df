//! `PacketPassInterface`: the push-model flow interface, producer to
//! consumer (spec §4.D).
//!
//! The producer calls [`PacketPass::send`]; the consumer must call the
//! supplied `done` callback exactly once to signal it is finished with the
//! buffer, either synchronously (before `send` returns) or later. The
//! producer must not call `send` again until `done` fires or a `cancel`
//! completes. `cancel` is an optional capability, advertised by
//! [`PacketPass::supports_cancel`]; when present, the consumer must
//! guarantee by the time `cancel` returns that it will neither touch the
//! buffer again nor call `done`.

/// Invoked by the consumer once it no longer needs the buffer passed to
/// `send`. `FnOnce` because it fires exactly once per `send`.
pub type DoneCallback = Box<dyn FnOnce()>;

pub trait PacketPass {
    /// Maximum packet size this sink will accept.
    fn mtu(&self) -> usize;

    /// True if `cancel` is a supported operation on this sink.
    fn supports_cancel(&self) -> bool {
        false
    }

    /// Hands `data` (`data.len() <= mtu()`) to the consumer.
    fn send(&mut self, data: Vec<u8>, done: DoneCallback);

    /// Aborts an outstanding `send`. Only valid when `supports_cancel()` is
    /// true and a `send` is currently outstanding (no `done` yet).
    fn cancel(&mut self) {}

    /// Releases this flow from whatever scheduler it is registered with.
    /// No-op by default; sinks that are themselves a scheduler's per-flow
    /// input (e.g. `FairQueueInput`, `PriorityQueueInput`) override this to
    /// deregister and cancel an in-flight send if this flow is the active
    /// one.
    fn release(&self) {}
}
