//! PacketPassFairQueue (spec §4.F): merges N flows onto one downstream using
//! a virtual-time scheduler. Each flow carries a `time` value; queuing a
//! packet records the flow's current `time` as its scheduling key, and the
//! flow with the smallest key is serviced next (ties broken by flow id, i.e.
//! insertion order). Serviced flows are stamped with a fresh value past the
//! current maximum, so repeatedly-busy flows cannot starve quiet ones.
//!
//! Invariant: at most one packet may be queued per flow (spec §4.F).

use crate::flow::packet_pass::{DoneCallback, PacketPass};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct Flow {
    time: u64,
    queued: Option<(Vec<u8>, DoneCallback)>,
    released: bool,
}

struct Inner<D> {
    downstream: RefCell<D>,
    flows: RefCell<Vec<Flow>>,
    next_time: Cell<u64>,
    active: Cell<Option<usize>>,
    driving: Cell<bool>,
    supports_cancel: bool,
}

/// Owns the shared downstream and the set of flows feeding it.
pub struct FairQueue<D> {
    inner: Rc<Inner<D>>,
}

/// One flow's input port. Implements [`PacketPass`]; `send` here queues the
/// packet for the fair scheduler rather than forwarding immediately.
pub struct FairQueueInput<D> {
    inner: Rc<Inner<D>>,
    flow_id: usize,
}

impl<D: PacketPass + 'static> FairQueue<D> {
    pub fn new(downstream: D) -> Self {
        let supports_cancel = downstream.supports_cancel();
        FairQueue {
            inner: Rc::new(Inner {
                downstream: RefCell::new(downstream),
                flows: RefCell::new(Vec::new()),
                next_time: Cell::new(0),
                active: Cell::new(None),
                driving: Cell::new(false),
                supports_cancel,
            }),
        }
    }

    /// Registers a new flow, returning its input port.
    pub fn add_flow(&self) -> FairQueueInput<D> {
        let mut flows = self.inner.flows.borrow_mut();
        let flow_id = flows.len();
        flows.push(Flow {
            time: 0,
            queued: None,
            released: false,
        });
        drop(flows);
        FairQueueInput {
            inner: self.inner.clone(),
            flow_id,
        }
    }

    pub fn flow_count(&self) -> usize {
        self.inner.flows.borrow().len()
    }
}

impl<D: PacketPass + 'static> FairQueueInput<D> {
    /// Removes this flow from scheduling. A packet still queued for it is
    /// dropped without firing `done` (lossy, matching `Connector::detach`).
    /// If this flow's packet is the one currently in flight downstream and
    /// the downstream supports `cancel`, the in-flight send is cancelled.
    pub fn release(&self) {
        let mut flows = self.inner.flows.borrow_mut();
        flows[self.flow_id].queued = None;
        flows[self.flow_id].released = true;
        if self.inner.active.get() == Some(self.flow_id) && self.inner.supports_cancel {
            drop(flows);
            self.inner.downstream.borrow_mut().cancel();
            self.inner.active.set(None);
        }
    }
}

impl<D: PacketPass + 'static> PacketPass for FairQueueInput<D> {
    fn mtu(&self) -> usize {
        self.inner.downstream.borrow().mtu()
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        {
            let mut flows = self.inner.flows.borrow_mut();
            let flow = &mut flows[self.flow_id];
            debug_assert!(
                flow.queued.is_none(),
                "fair queue flow contract violated: packet arrived while one was already queued"
            );
            flow.queued = Some((data, done));
        }
        drive(&self.inner);
    }

    fn release(&self) {
        FairQueueInput::release(self);
    }
}

fn pick_next<D>(inner: &Inner<D>) -> Option<usize> {
    let flows = inner.flows.borrow();
    flows
        .iter()
        .enumerate()
        .filter(|(_, f)| f.queued.is_some() && !f.released)
        .min_by_key(|(idx, f)| (f.time, *idx))
        .map(|(idx, _)| idx)
}

fn drive<D: PacketPass + 'static>(inner: &Rc<Inner<D>>) {
    if inner.driving.replace(true) {
        return;
    }
    loop {
        if inner.active.get().is_some() {
            break;
        }
        let Some(flow_id) = pick_next(inner.as_ref()) else {
            break;
        };
        let (data, done) = inner.flows.borrow_mut()[flow_id]
            .queued
            .take()
            .expect("pick_next only returns queued flows");
        let new_time = inner.next_time.get() + 1;
        inner.next_time.set(new_time);
        inner.flows.borrow_mut()[flow_id].time = new_time;

        inner.active.set(Some(flow_id));
        let weak: Weak<Inner<D>> = Rc::downgrade(inner);
        let fired = Rc::new(Cell::new(false));
        let fired_cb = fired.clone();
        inner.downstream.borrow_mut().send(
            data,
            Box::new(move || {
                fired_cb.set(true);
                done();
                if let Some(inner) = weak.upgrade() {
                    inner.active.set(None);
                    drive(&inner);
                }
            }),
        );
        if !fired.get() {
            break;
        }
    }
    inner.driving.set(false);
}
