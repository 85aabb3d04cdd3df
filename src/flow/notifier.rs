//! `Notifier`: a transparent [`PacketPass`] pass-through that invokes a
//! registered hook on every packet. Used by the keep-alive machinery
//! (`liveness::inactivity_monitor`) to observe data-plane activity without
//! participating in the buffer's ownership.

use super::packet_pass::{DoneCallback, PacketPass};

pub struct Notifier<D> {
    downstream: D,
    hook: Box<dyn FnMut(&[u8])>,
}

impl<D: PacketPass> Notifier<D> {
    pub fn new(downstream: D, hook: impl FnMut(&[u8]) + 'static) -> Self {
        Notifier {
            downstream,
            hook: Box::new(hook),
        }
    }

    pub fn into_downstream(self) -> D {
        self.downstream
    }
}

impl<D: PacketPass> PacketPass for Notifier<D> {
    fn mtu(&self) -> usize {
        self.downstream.mtu()
    }

    fn supports_cancel(&self) -> bool {
        self.downstream.supports_cancel()
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        (self.hook)(&data);
        self.downstream.send(data, done);
    }

    fn cancel(&mut self) {
        self.downstream.cancel();
    }
}
