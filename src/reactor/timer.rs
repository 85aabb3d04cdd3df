//! Timer wheel backing `Reactor::set_timer`.
//!
//! Timers fire in monotonic deadline order within a tick, ties broken by
//! insertion order (spec §5). Re-arming a timer is idempotent: each arm
//! bumps a generation counter on the timer so stale heap entries from a
//! previous arm are recognized and discarded lazily rather than searched
//! for and removed eagerly.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};
use std::time::Instant;

pub(crate) struct TimerInner {
    pub(crate) deadline: Option<Instant>,
    generation: u64,
    pub(crate) callback: Rc<RefCell<dyn FnMut()>>,
}

/// A one-shot timer handle. Construct via [`crate::reactor::Reactor::new_timer`],
/// arm with [`crate::reactor::Reactor::set_timer`].
#[derive(Clone)]
pub struct Timer {
    pub(crate) inner: Rc<RefCell<TimerInner>>,
}

impl Timer {
    pub(crate) fn new(callback: impl FnMut() + 'static) -> Self {
        Timer {
            inner: Rc::new(RefCell::new(TimerInner {
                deadline: None,
                generation: 0,
                callback: Rc::new(RefCell::new(callback)),
            })),
        }
    }

    /// True iff the timer currently has a pending deadline.
    pub fn is_set(&self) -> bool {
        self.inner.borrow().deadline.is_some()
    }

    /// Removes any pending deadline without firing the callback.
    pub fn unset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.deadline = None;
        inner.generation += 1;
    }
}

struct HeapEntry {
    deadline: Instant,
    seq: u64,
    generation: u64,
    timer: Weak<RefCell<TimerInner>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline
        // first, ties broken by earlier insertion sequence.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub(crate) struct TimerWheel {
    heap: BinaryHeap<HeapEntry>,
    next_seq: u64,
}

impl TimerWheel {
    pub(crate) fn arm(&mut self, timer: &Timer, deadline: Instant) {
        let (generation, seq) = {
            let mut inner = timer.inner.borrow_mut();
            inner.deadline = Some(deadline);
            inner.generation += 1;
            let seq = self.next_seq;
            self.next_seq += 1;
            (inner.generation, seq)
        };
        self.heap.push(HeapEntry {
            deadline,
            seq,
            generation,
            timer: Rc::downgrade(&timer.inner),
        });
    }

    fn discard_stale_front(&mut self) {
        while let Some(top) = self.heap.peek() {
            match top.timer.upgrade() {
                None => {
                    self.heap.pop();
                }
                Some(inner) => {
                    let inner_ref = inner.borrow();
                    if inner_ref.generation != top.generation || inner_ref.deadline != Some(top.deadline) {
                        drop(inner_ref);
                        self.heap.pop();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Earliest live deadline, if any.
    pub(crate) fn peek_deadline(&mut self) -> Option<Instant> {
        self.discard_stale_front();
        self.heap.peek().map(|e| e.deadline)
    }

    /// Pops and returns every timer whose deadline is `<= now`, in
    /// monotonic deadline order (insertion order on ties). Each returned
    /// timer has already been cleared back to not-set; firing the callback
    /// is the caller's responsibility.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<Rc<RefCell<dyn FnMut()>>> {
        let mut fired = Vec::new();
        loop {
            self.discard_stale_front();
            match self.heap.peek() {
                Some(top) if top.deadline <= now => {
                    let entry = self.heap.pop().unwrap();
                    if let Some(inner) = entry.timer.upgrade() {
                        let mut inner_mut = inner.borrow_mut();
                        inner_mut.deadline = None;
                        fired.push(inner_mut.callback.clone());
                    }
                }
                _ => break,
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order_with_insertion_tiebreak() {
        let mut wheel = TimerWheel::default();
        let base = Instant::now();
        let trace = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        let t_a = Timer::new({
            let trace = trace.clone();
            move || trace.borrow_mut().push("a")
        });
        let t_b = Timer::new({
            let trace = trace.clone();
            move || trace.borrow_mut().push("b")
        });
        let t_c = Timer::new({
            let trace = trace.clone();
            move || trace.borrow_mut().push("c")
        });

        // b and c share a deadline; b was armed first, so it must fire first.
        wheel.arm(&t_a, base + Duration::from_millis(10));
        wheel.arm(&t_b, base + Duration::from_millis(20));
        wheel.arm(&t_c, base + Duration::from_millis(20));

        let due = wheel.pop_due(base + Duration::from_millis(25));
        for cb in &due {
            (cb.borrow_mut())();
        }
        assert_eq!(*trace.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn re_arming_is_idempotent_and_drops_stale_entry() {
        let mut wheel = TimerWheel::default();
        let base = Instant::now();
        let fired = Rc::new(RefCell::new(0u32));
        let t = Timer::new({
            let fired = fired.clone();
            move || *fired.borrow_mut() += 1
        });

        wheel.arm(&t, base + Duration::from_millis(5));
        wheel.arm(&t, base + Duration::from_millis(50)); // re-arm, pushes deadline out

        let due = wheel.pop_due(base + Duration::from_millis(10));
        assert!(due.is_empty(), "stale early deadline must not fire");

        let due = wheel.pop_due(base + Duration::from_millis(60));
        assert_eq!(due.len(), 1);
    }
}
