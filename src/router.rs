//! PacketRouter (spec §4.L): pulls Ethernet frames off a TAP-like
//! [`PacketRecv`] source and hands each one to a user dispatch callback,
//! which examines it and drives 0..N [`crate::dataproto::LocalSource::route`]
//! calls — the last with `more=false` — to forward it to chosen peers.

use crate::flow::packet_recv::PacketRecv;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Inner<T> {
    source: RefCell<T>,
    dispatch: RefCell<Box<dyn FnMut(&[u8])>>,
    pumping: Cell<bool>,
    running: Cell<bool>,
}

/// Owns the pull loop; drops the TAP source and stops dispatching once its
/// last handle is dropped.
pub struct PacketRouter<T: PacketRecv + 'static> {
    inner: Rc<Inner<T>>,
}

impl<T: PacketRecv + 'static> Clone for PacketRouter<T> {
    fn clone(&self) -> Self {
        PacketRouter { inner: self.inner.clone() }
    }
}

impl<T: PacketRecv + 'static> PacketRouter<T> {
    /// Starts pulling from `source` immediately; `dispatch` is called once
    /// per frame with the raw Ethernet bytes. The router does not itself
    /// call `route` — it only delivers frames to `dispatch`, which the
    /// caller writes to pick recipients and call `route` on their behalf.
    pub fn new(source: T, dispatch: impl FnMut(&[u8]) + 'static) -> Self {
        let inner = Rc::new(Inner {
            source: RefCell::new(source),
            dispatch: RefCell::new(Box::new(dispatch)),
            pumping: Cell::new(false),
            running: Cell::new(true),
        });
        Inner::pump(&inner);
        PacketRouter { inner }
    }

    /// Stops pulling further frames. Already-dispatched frames are
    /// unaffected; this only prevents the next `recv`.
    pub fn stop(&self) {
        self.inner.running.set(false);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }
}

impl<T: PacketRecv + 'static> Inner<T> {
    fn pump(inner: &Rc<Inner<T>>) {
        if !inner.running.get() || inner.pumping.replace(true) {
            return;
        }
        let weak = Rc::downgrade(inner);
        let fired = Rc::new(Cell::new(false));
        let fired_cb = fired.clone();
        inner.source.borrow_mut().recv(Box::new(move |frame| {
            fired_cb.set(true);
            if let Some(inner) = weak.upgrade() {
                inner.pumping.set(false);
                if !inner.running.get() {
                    return;
                }
                (inner.dispatch.borrow_mut())(&frame);
                Inner::pump(&inner);
            }
        }));
        if !fired.get() {
            inner.pumping.set(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::test_support::LoopbackTap;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn queued_frame_is_delivered_to_dispatch_synchronously() {
        let tap = LoopbackTap::new(1500);
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let seen_cb = seen.clone();
        let _router = PacketRouter::new(tap, move |frame| seen_cb.borrow_mut().push(frame.to_vec()));
        // Nothing queued yet: no dispatch should have fired.
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn each_pushed_frame_triggers_exactly_one_dispatch_call() {
        let tap = LoopbackTap::new(1500);
        let tap = Rc::new(StdRefCell::new(tap));
        let dispatch_tap = tap.clone();
        // Route frames through the router by installing it as a PacketRecv
        // that pulls from the shared tap handle.
        struct Shared(Rc<StdRefCell<LoopbackTap>>);
        impl crate::flow::packet_recv::PacketRecv for Shared {
            fn mtu(&self) -> usize {
                1500
            }
            fn recv(&mut self, done: crate::flow::packet_recv::RecvDoneCallback) {
                self.0.borrow_mut().recv(done);
            }
        }

        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let seen_cb = seen.clone();
        let _router = PacketRouter::new(Shared(tap.clone()), move |frame| seen_cb.borrow_mut().push(frame.to_vec()));

        dispatch_tap.borrow_mut().push(vec![1, 2, 3]);
        assert_eq!(*seen.borrow(), vec![vec![1, 2, 3]]);

        dispatch_tap.borrow_mut().push(vec![4, 5]);
        assert_eq!(*seen.borrow(), vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn stop_prevents_further_dispatch() {
        let tap = LoopbackTap::new(1500);
        let tap = Rc::new(StdRefCell::new(tap));
        struct Shared(Rc<StdRefCell<LoopbackTap>>);
        impl crate::flow::packet_recv::PacketRecv for Shared {
            fn mtu(&self) -> usize {
                1500
            }
            fn recv(&mut self, done: crate::flow::packet_recv::RecvDoneCallback) {
                self.0.borrow_mut().recv(done);
            }
        }

        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let seen_cb = seen.clone();
        let router = PacketRouter::new(Shared(tap.clone()), move |frame| seen_cb.borrow_mut().push(frame.to_vec()));
        router.stop();
        assert!(!router.is_running());

        tap.borrow_mut().push(vec![1]);
        // The router had no outstanding recv once stopped, so nothing fires.
        assert!(seen.borrow().is_empty());
    }
}
