//! `Copier`: one packet buffer, acts as a [`PacketPass`] downstream and a
//! [`PacketRecv`] upstream. Decouples two otherwise incompatible flow
//! directions — a push producer feeding a pull consumer — by holding at
//! most one packet in flight between them (spec §4.D, invariant 1).

use super::packet_pass::{DoneCallback, PacketPass};
use super::packet_recv::{PacketRecv, RecvDoneCallback};
use std::cell::RefCell;
use std::rc::Rc;

pub struct Copier {
    mtu: usize,
    slot: Rc<RefCell<Option<Vec<u8>>>>,
    pending_recv: Rc<RefCell<Option<RecvDoneCallback>>>,
}

impl Copier {
    pub fn new(mtu: usize) -> Self {
        Copier {
            mtu,
            slot: Rc::new(RefCell::new(None)),
            pending_recv: Rc::new(RefCell::new(None)),
        }
    }
}

impl PacketPass for Copier {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        debug_assert!(
            self.slot.borrow().is_none(),
            "Copier::send called while a previous packet is still buffered"
        );
        if let Some(recv_done) = self.pending_recv.borrow_mut().take() {
            recv_done(data);
        } else {
            *self.slot.borrow_mut() = Some(data);
        }
        done();
    }
}

impl PacketRecv for Copier {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn recv(&mut self, done: RecvDoneCallback) {
        if let Some(data) = self.slot.borrow_mut().take() {
            done(data);
        } else {
            *self.pending_recv.borrow_mut() = Some(done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn recv_before_send_is_satisfied_once_data_arrives() {
        let mut copier = Copier::new(1500);
        let got = Rc::new(StdRefCell::new(None));
        let got_cb = got.clone();
        copier.recv(Box::new(move |data| *got_cb.borrow_mut() = Some(data)));
        assert!(got.borrow().is_none());

        copier.send(vec![1, 2, 3], Box::new(|| {}));
        assert_eq!(*got.borrow(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn send_before_recv_buffers_then_delivers() {
        let mut copier = Copier::new(1500);
        let done_called = Rc::new(StdRefCell::new(false));
        let done_cb = done_called.clone();
        copier.send(vec![9, 9], Box::new(move || *done_cb.borrow_mut() = true));
        assert!(*done_called.borrow());

        let got = Rc::new(StdRefCell::new(None));
        let got_cb = got.clone();
        copier.recv(Box::new(move |data| *got_cb.borrow_mut() = Some(data)));
        assert_eq!(*got.borrow(), Some(vec![9, 9]));
    }
}
