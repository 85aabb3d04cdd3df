//! `Connector`: a [`PacketPass`] whose downstream can be attached, detached,
//! and reattached at runtime. Queues no packets itself — at most one send is
//! held as pending while detached, released to whatever downstream attaches
//! next (spec §4.D; used by `dataproto::local_source` to bind a route to a
//! destination that may disappear and reappear under churn).

use super::packet_pass::{DoneCallback, PacketPass};
use std::cell::RefCell;
use std::rc::Rc;

type PendingSend = (Vec<u8>, DoneCallback);

pub struct Connector {
    mtu: usize,
    downstream: Rc<RefCell<Option<Box<dyn PacketPass>>>>,
    pending: Rc<RefCell<Option<PendingSend>>>,
}

impl Connector {
    pub fn new(mtu: usize) -> Self {
        Connector {
            mtu,
            downstream: Rc::new(RefCell::new(None)),
            pending: Rc::new(RefCell::new(None)),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.downstream.borrow().is_some()
    }

    /// Attaches a downstream, releasing any send that was held while
    /// detached. Panics if already attached — callers must `detach` first.
    pub fn attach(&mut self, downstream: Box<dyn PacketPass>) {
        assert!(
            self.downstream.borrow().is_none(),
            "Connector::attach called while already attached"
        );
        *self.downstream.borrow_mut() = Some(downstream);
        if let Some((data, done)) = self.pending.borrow_mut().take() {
            self.downstream
                .borrow_mut()
                .as_mut()
                .expect("just attached")
                .send(data, done);
        }
    }

    /// Detaches the downstream, returning it. A send left pending is
    /// discarded without invoking its `done` callback — per spec Open
    /// Question resolution, detach is lossy rather than failure-reporting.
    pub fn detach(&mut self) -> Option<Box<dyn PacketPass>> {
        self.pending.borrow_mut().take();
        self.downstream.borrow_mut().take()
    }
}

impl PacketPass for Connector {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        debug_assert!(
            self.pending.borrow().is_none(),
            "Connector::send called while a previous send is still outstanding"
        );
        if let Some(downstream) = self.downstream.borrow_mut().as_mut() {
            downstream.send(data, done);
        } else {
            *self.pending.borrow_mut() = Some((data, done));
        }
    }

    fn cancel(&mut self) {
        if self.pending.borrow_mut().take().is_none() {
            if let Some(downstream) = self.downstream.borrow_mut().as_mut() {
                downstream.cancel();
            }
        }
    }
}
