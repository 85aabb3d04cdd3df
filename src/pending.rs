//! Pending-job queue (`BPending` in the original): LIFO-ordered deferred
//! execution within the current reactor tick.
//!
//! The LIFO discipline gives "continue-here-after-this-returns" semantics:
//! any flow operation that would otherwise recurse can defer its
//! continuation into a later top-of-stack job instead, which is how the flow
//! framework (`flow::*`) avoids unbounded call-stack growth on reentrant
//! `send`/`done` chains.

use std::cell::RefCell;
use std::rc::Rc;

type Handler = Rc<RefCell<dyn FnMut()>>;

struct JobSlot {
    set: bool,
    handler: Handler,
}

/// Scope in which `PendingJob` handles belonging to one reactor live.
///
/// Mirrors `BPendingGroup`: a single list of jobs drained LIFO between
/// external events. Removing a job from the middle of the "set" stack (on
/// re-`set`, or on drop) is O(n) in the number of currently-set jobs, which
/// in this core is always small — at most one per live flow link.
#[derive(Clone)]
pub struct PendingGroup {
    inner: Rc<RefCell<PendingGroupInner>>,
}

#[derive(Default)]
struct PendingGroupInner {
    slots: Vec<Option<JobSlot>>,
    free: Vec<usize>,
    /// Stack of live job ids, bottom to top; `order.last()` runs next.
    order: Vec<usize>,
}

impl PendingGroup {
    pub fn new() -> Self {
        PendingGroup {
            inner: Rc::new(RefCell::new(PendingGroupInner::default())),
        }
    }

    /// True iff there is at least one set job in the queue.
    pub fn has_jobs(&self) -> bool {
        !self.inner.borrow().order.is_empty()
    }

    /// Executes the top job: removes it from the queue, transitions it to
    /// not-set, then invokes its handler. Panics if the queue is empty,
    /// matching `BPendingGroup_ExecuteJob`'s documented precondition.
    pub fn execute_job(&self) {
        let handler = {
            let mut inner = self.inner.borrow_mut();
            let job_id = inner
                .order
                .pop()
                .expect("execute_job called on an empty pending queue");
            let slot = inner.slots[job_id]
                .as_mut()
                .expect("pending job slot freed while still queued");
            slot.set = false;
            slot.handler.clone()
        };
        (handler.borrow_mut())();
    }

    /// Drains every job currently set, executing them LIFO until empty.
    /// Jobs set during a handler (including by that same handler) are
    /// picked up before the drain returns.
    pub fn drain(&self) {
        while self.has_jobs() {
            self.execute_job();
        }
    }
}

impl Default for PendingGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for queuing a job for execution (`BPending`).
///
/// Observable states are *set* and *not-set*. Dropping a set handle removes
/// it from the queue; its handler will not run.
pub struct PendingJob {
    group: PendingGroup,
    id: usize,
}

impl PendingJob {
    /// Creates a job bound to `group`, initially not-set.
    pub fn new<F: FnMut() + 'static>(group: &PendingGroup, handler: F) -> Self {
        let mut inner = group.inner.borrow_mut();
        let slot = JobSlot {
            set: false,
            handler: Rc::new(RefCell::new(handler)),
        };
        let id = if let Some(free_id) = inner.free.pop() {
            inner.slots[free_id] = Some(slot);
            free_id
        } else {
            inner.slots.push(Some(slot));
            inner.slots.len() - 1
        };
        drop(inner);
        PendingJob {
            group: group.clone(),
            id,
        }
    }

    /// Pushes the job to the top of the queue, removing any prior position
    /// first. Ordering guarantee: if A is set before B with no intervening
    /// execute, B runs before A.
    pub fn set(&self) {
        let mut inner = self.group.inner.borrow_mut();
        let was_set = inner.slots[self.id].as_ref().unwrap().set;
        if was_set {
            let id = self.id;
            inner.order.retain(|&j| j != id);
        }
        inner.slots[self.id].as_mut().unwrap().set = true;
        inner.order.push(self.id);
    }

    /// Removes the job from the queue if present. No-op if not set.
    pub fn unset(&self) {
        let mut inner = self.group.inner.borrow_mut();
        let slot = inner.slots[self.id].as_mut().unwrap();
        if slot.set {
            slot.set = false;
            let id = self.id;
            inner.order.retain(|&j| j != id);
        }
    }

    pub fn is_set(&self) -> bool {
        self.group.inner.borrow().slots[self.id].as_ref().unwrap().set
    }
}

impl Drop for PendingJob {
    fn drop(&mut self) {
        let mut inner = self.group.inner.borrow_mut();
        let was_set = inner.slots[self.id].as_ref().map(|s| s.set).unwrap_or(false);
        if was_set {
            let id = self.id;
            inner.order.retain(|&j| j != id);
        }
        inner.slots[self.id] = None;
        inner.free.push(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_order_and_reentrant_set() {
        let group = PendingGroup::new();
        let trace = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        let t1 = trace.clone();
        let h1 = PendingJob::new(&group, move || t1.borrow_mut().push("h1"));
        let t2 = trace.clone();
        let h2 = PendingJob::new(&group, move || t2.borrow_mut().push("h2"));

        // h4 is created lazily inside h3's handler to exercise "set during
        // drain" ordering (scenario 6 in spec §8): h4 must run before h2.
        let h4_slot: Rc<RefCell<Option<PendingJob>>> = Rc::new(RefCell::new(None));
        let h4_slot_for_h3 = h4_slot.clone();
        let group_for_h3 = group.clone();
        let t3 = trace.clone();
        let h3 = PendingJob::new(&group, move || {
            t3.borrow_mut().push("h3");
            let t4 = t3.clone();
            let h4 = PendingJob::new(&group_for_h3, move || t4.borrow_mut().push("h4"));
            h4.set();
            *h4_slot_for_h3.borrow_mut() = Some(h4);
        });

        h1.set();
        h2.set();
        h3.set();

        group.drain();

        assert_eq!(*trace.borrow(), vec!["h3", "h4", "h2", "h1"]);
    }

    #[test]
    fn set_then_unset_is_a_no_op() {
        let group = PendingGroup::new();
        let job = PendingJob::new(&group, || {});
        assert!(!group.has_jobs());
        job.set();
        job.unset();
        assert!(!group.has_jobs());
        assert!(!job.is_set());
    }

    #[test]
    fn re_set_moves_to_top_without_duplicate_run() {
        let group = PendingGroup::new();
        let trace = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        let t1 = trace.clone();
        let h1 = PendingJob::new(&group, move || t1.borrow_mut().push("h1"));
        let t2 = trace.clone();
        let h2 = PendingJob::new(&group, move || t2.borrow_mut().push("h2"));

        h1.set();
        h2.set();
        h1.set(); // re-set h1: moves to top, still runs exactly once

        group.drain();
        assert_eq!(*trace.borrow(), vec!["h1", "h2"]);
    }

    #[test]
    fn dropping_a_set_job_removes_it_without_running() {
        let group = PendingGroup::new();
        let ran = Rc::new(RefCell::new(false));
        let ran_clone = ran.clone();
        {
            let job = PendingJob::new(&group, move || *ran_clone.borrow_mut() = true);
            job.set();
        }
        assert!(!group.has_jobs());
        group.drain();
        assert!(!*ran.borrow());
    }
}
