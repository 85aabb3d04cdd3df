//! `Blocker`: a [`PacketRecv`] pass-through that can be toggled to withhold
//! the downstream request. Combined with `liveness::keepalive_source` and a
//! `Buffer::single`, this gates the keep-alive generator to fire only at the
//! desired cadence instead of on every queue poll (spec §4.G).

use super::packet_recv::{PacketRecv, RecvDoneCallback};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub struct Blocker<U> {
    upstream: U,
    blocked: Rc<Cell<bool>>,
    pending: Rc<RefCell<Option<RecvDoneCallback>>>,
}

impl<U: PacketRecv> Blocker<U> {
    pub fn new(upstream: U, initially_blocked: bool) -> Self {
        Blocker {
            upstream,
            blocked: Rc::new(Cell::new(initially_blocked)),
            pending: Rc::new(RefCell::new(None)),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.get()
    }

    /// Sets the blocked state. Unblocking releases any recv request that was
    /// held while blocked.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked.set(blocked);
        if !blocked {
            if let Some(done) = self.pending.borrow_mut().take() {
                self.upstream.recv(done);
            }
        }
    }
}

impl<U: PacketRecv> PacketRecv for Blocker<U> {
    fn mtu(&self) -> usize {
        self.upstream.mtu()
    }

    fn supports_cancel(&self) -> bool {
        self.upstream.supports_cancel()
    }

    fn recv(&mut self, done: RecvDoneCallback) {
        if self.blocked.get() {
            debug_assert!(
                self.pending.borrow().is_none(),
                "Blocker::recv called while a previous request is still outstanding"
            );
            *self.pending.borrow_mut() = Some(done);
        } else {
            self.upstream.recv(done);
        }
    }

    fn cancel(&mut self) {
        if self.pending.borrow_mut().take().is_none() {
            self.upstream.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::buffer::Buffer;
    use crate::flow::packet_pass::PacketPass;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    #[test]
    fn request_made_while_blocked_only_fires_after_unblock() {
        let mut source = Buffer::single(1500);
        source.send(vec![1, 2, 3], Box::new(|| {}));

        let mut blocker = Blocker::new(source, true);
        let got = StdRc::new(StdRefCell::new(None));
        let got_cb = got.clone();
        blocker.recv(Box::new(move |data| *got_cb.borrow_mut() = Some(data)));
        assert!(got.borrow().is_none(), "blocked recv must not reach upstream yet");

        blocker.set_blocked(false);
        assert_eq!(*got.borrow(), Some(vec![1, 2, 3]));
    }
}
