//! PacketPassPriorityQueue (spec §4.F): same multiplexer as
//! [`super::fair_queue::FairQueue`], but the scheduling key is each flow's
//! static priority (smaller value = higher priority) instead of a
//! virtual-time counter. Cancellation is self-initiated only: a flow's
//! arrival never reaches into another flow's in-flight send — the sole
//! cancel path is a flow releasing itself while it is the one active,
//! matching `PacketPassPriorityQueueFlow_Release`'s `ASSERT(flow ==
//! flow->m->sending_flow)` in the original.

use crate::flow::packet_pass::{DoneCallback, PacketPass};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct Flow {
    priority: i32,
    queued: Option<(Vec<u8>, DoneCallback)>,
    released: bool,
}

struct Inner<D> {
    downstream: RefCell<D>,
    flows: RefCell<Vec<Flow>>,
    active: Cell<Option<usize>>,
    driving: Cell<bool>,
    supports_cancel: bool,
}

pub struct PriorityQueue<D> {
    inner: Rc<Inner<D>>,
}

pub struct PriorityQueueInput<D> {
    inner: Rc<Inner<D>>,
    flow_id: usize,
}

impl<D: PacketPass + 'static> PriorityQueue<D> {
    pub fn new(downstream: D) -> Self {
        let supports_cancel = downstream.supports_cancel();
        PriorityQueue {
            inner: Rc::new(Inner {
                downstream: RefCell::new(downstream),
                flows: RefCell::new(Vec::new()),
                active: Cell::new(None),
                driving: Cell::new(false),
                supports_cancel,
            }),
        }
    }

    /// Registers a new flow at a fixed `priority` (smaller = higher).
    pub fn add_flow(&self, priority: i32) -> PriorityQueueInput<D> {
        let mut flows = self.inner.flows.borrow_mut();
        let flow_id = flows.len();
        flows.push(Flow {
            priority,
            queued: None,
            released: false,
        });
        drop(flows);
        PriorityQueueInput {
            inner: self.inner.clone(),
            flow_id,
        }
    }
}

impl<D: PacketPass + 'static> PriorityQueueInput<D> {
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

impl<D: PacketPass + 'static> PacketPass for PriorityQueueInput<D> {
    fn mtu(&self) -> usize {
        self.inner.downstream.borrow().mtu()
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        {
            let mut flows = self.inner.flows.borrow_mut();
            let flow = &mut flows[self.flow_id];
            debug_assert!(
                flow.queued.is_none(),
                "priority queue flow contract violated: packet arrived while one was already queued"
            );
            flow.queued = Some((data, done));
        }
        drive(&self.inner);
    }

    fn release(&self) {
        PriorityQueueInput::release(self);
    }
}

fn pick_next<D>(inner: &Inner<D>) -> Option<usize> {
    let flows = inner.flows.borrow();
    flows
        .iter()
        .enumerate()
        .filter(|(_, f)| f.queued.is_some() && !f.released)
        .min_by_key(|(idx, f)| (f.priority, *idx))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ManualSink {
        received: Rc<RefCell<Vec<Vec<u8>>>>,
        held: Rc<RefCell<std::collections::VecDeque<DoneCallback>>>,
    }

    impl PacketPass for ManualSink {
        fn mtu(&self) -> usize {
            1500
        }
        fn supports_cancel(&self) -> bool {
            true
        }
        fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
            self.received.borrow_mut().push(data);
            self.held.borrow_mut().push_back(done);
        }
        fn cancel(&mut self) {
            // Drop the held `done` without firing it: downstream aborted.
            self.held.borrow_mut().pop_front();
        }
    }

    #[test]
    fn higher_priority_flow_goes_first_when_both_are_queued() {
        let sink = ManualSink::default();
        let received = sink.received.clone();
        let held = sink.held.clone();
        let queue = PriorityQueue::new(sink);
        let mut low = queue.add_flow(10);
        let mut high = queue.add_flow(0);

        // Occupy the downstream with a flow of higher priority than either
        // `low` or `high`, so queuing them below doesn't trigger preemption.
        let mut filler = queue.add_flow(-100);
        filler.send(vec![0], Box::new(|| {}));

        low.send(vec![1], Box::new(|| {}));
        high.send(vec![2], Box::new(|| {}));

        let done = held.borrow_mut().pop_front().unwrap();
        done();

        assert_eq!(*received.borrow(), vec![vec![0], vec![2]]);
    }

    #[test]
    fn newly_runnable_higher_priority_flow_waits_behind_the_active_send() {
        let sink = ManualSink::default();
        let received = sink.received.clone();
        let held = sink.held.clone();
        let queue = PriorityQueue::new(sink);
        let mut low = queue.add_flow(10);
        let mut high = queue.add_flow(0);

        low.send(vec![1], Box::new(|| {})); // dispatches immediately, now active
        assert_eq!(held.borrow().len(), 1);

        // `high` outranks `low`, but arrival never reaches into another
        // flow's in-flight send: it only enqueues and waits.
        high.send(vec![2], Box::new(|| {}));
        assert_eq!(held.borrow().len(), 1, "low's send is still the one in flight");
        assert_eq!(*received.borrow(), vec![vec![1]]);

        let done = held.borrow_mut().pop_front().unwrap();
        done();
        assert_eq!(*received.borrow(), vec![vec![1], vec![2]]);
    }

    #[test]
    fn releasing_the_active_flow_itself_cancels_its_in_flight_send() {
        let sink = ManualSink::default();
        let held = sink.held.clone();
        let queue = PriorityQueue::new(sink);
        let mut low = queue.add_flow(10);

        low.send(vec![1], Box::new(|| {})); // dispatches immediately, now active
        assert_eq!(held.borrow().len(), 1);

        low.release();
        assert_eq!(held.borrow().len(), 0, "self-release cancels the downstream send");
    }
}
