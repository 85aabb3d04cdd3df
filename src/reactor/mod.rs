//! Single-threaded event loop (`BReactor` in the original, spec §4.A).
//!
//! Scheduling model: cooperative. A callback runs to completion before any
//! other event is considered. Between any two external events, the pending
//! job queue (`crate::pending`) is drained to empty (spec §5). This is built
//! on a single-threaded `tokio` runtime the way the teacher's
//! `client/device.rs` and `client/relay.rs` drive their own loops with
//! `tokio::select!`/`tokio::time::interval`, generalized here into a
//! reusable scheduler instead of one bespoke loop per subsystem.

pub mod timer;

use crate::pending::PendingGroup;
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Instant;
use timer::{Timer, TimerWheel};
use tokio::sync::Notify;

/// Observed or requested I/O readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoEvents {
    pub readable: bool,
    pub writable: bool,
}

impl IoEvents {
    pub const NONE: IoEvents = IoEvents {
        readable: false,
        writable: false,
    };
    pub const READABLE: IoEvents = IoEvents {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: IoEvents = IoEvents {
        readable: false,
        writable: true,
    };

    pub fn any(&self) -> bool {
        self.readable || self.writable
    }

    pub fn union(self, other: IoEvents) -> IoEvents {
        IoEvents {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
        }
    }
}

/// An abstract I/O readiness source. The core never reads or writes bytes
/// through this trait itself — it only waits for readiness and dispatches a
/// callback — so the same `Reactor` drives a concrete TAP device, a UDP
/// socket, or (as in the tests) a fake readiness generator, without the core
/// depending on any of their concrete types (spec §4.M: the abstraction is
/// platform-agnostic).
pub trait IoSource {
    /// Waits until at least one event in `interest` is ready, and returns
    /// the observed subset. Must be safe to call repeatedly in a loop.
    fn ready(&mut self, interest: IoEvents) -> Pin<Box<dyn Future<Output = IoEvents> + '_>>;
}

struct IoRegistration {
    interest: Cell<IoEvents>,
    cancelled: Cell<bool>,
    wake: Rc<Notify>,
}

/// Handle returned by [`Reactor::add_io`]; drop or call
/// [`Reactor::remove_io`] to stop dispatching events to the callback.
pub struct IoHandle {
    reg: Rc<IoRegistration>,
}

impl IoHandle {
    fn cancel(&self) {
        self.reg.cancelled.set(true);
        self.reg.wake.notify_one();
    }
}

struct ReactorInner {
    pending: PendingGroup,
    timers: std::cell::RefCell<TimerWheel>,
    quit_code: Cell<Option<i32>>,
    wake: Rc<Notify>,
}

/// The event loop itself. Cheap to clone (all clones share the same
/// underlying state); clone it to hand a reactor handle to a child object
/// without giving up ownership of the original.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<ReactorInner>,
}

impl Reactor {
    pub fn new() -> Self {
        Reactor {
            inner: Rc::new(ReactorInner {
                pending: PendingGroup::new(),
                timers: std::cell::RefCell::new(TimerWheel::default()),
                quit_code: Cell::new(None),
                wake: Rc::new(Notify::new()),
            }),
        }
    }

    /// The pending-job scope for jobs belonging to this reactor.
    pub fn pending_group(&self) -> PendingGroup {
        self.inner.pending.clone()
    }

    /// Creates a new, initially unarmed timer whose callback runs on this
    /// reactor's thread when it fires.
    pub fn new_timer(&self, callback: impl FnMut() + 'static) -> Timer {
        Timer::new(callback)
    }

    /// Arms (or re-arms) `timer` to fire after `delay`. Re-arming an
    /// already-set timer is idempotent and reuses the same handle.
    pub fn set_timer(&self, timer: &Timer, delay: std::time::Duration) {
        self.inner.timers.borrow_mut().arm(timer, Instant::now() + delay);
        self.inner.wake.notify_one();
    }

    /// Disarms `timer` without firing it.
    pub fn clear_timer(&self, timer: &Timer) {
        timer.unset();
    }

    /// Registers an I/O readiness source. The callback is invoked with the
    /// observed event subset every time `source` reports readiness that
    /// intersects the current interest set. Adding is idempotent in the
    /// sense that each call creates an independent registration; callers
    /// that want "subscribe once" semantics keep the returned handle.
    ///
    /// Must be called from within a `tokio::task::LocalSet` context (the
    /// dispatch task holds `Rc` state and cannot be spawned onto a
    /// multi-threaded executor), matching the single-reactor-thread
    /// confinement the whole core relies on.
    pub fn add_io<S>(
        &self,
        mut source: S,
        interest: IoEvents,
        mut callback: impl FnMut(IoEvents) + 'static,
    ) -> IoHandle
    where
        S: IoSource + 'static,
    {
        let reg = Rc::new(IoRegistration {
            interest: Cell::new(interest),
            cancelled: Cell::new(false),
            wake: self.inner.wake.clone(),
        });
        let pending = self.inner.pending.clone();
        let task_reg = reg.clone();
        let local = tokio::task::spawn_local(async move {
            while !task_reg.cancelled.get() {
                let want = task_reg.interest.get();
                if !want.any() {
                    // Nothing requested right now; park until set_io_events
                    // wakes us with a non-empty interest or we're cancelled.
                    task_reg.wake.notified().await;
                    continue;
                }
                let got = source.ready(want).await;
                if task_reg.cancelled.get() {
                    break;
                }
                if got.any() {
                    callback(got);
                    pending.drain();
                }
            }
        });
        // Detach: the spawned task's own cancellation flag governs its
        // lifetime, not the JoinHandle.
        drop(local);
        IoHandle { reg }
    }

    /// Changes the interest set for a previously registered source.
    pub fn set_io_events(&self, handle: &IoHandle, interest: IoEvents) {
        handle.reg.interest.set(interest);
        handle.reg.wake.notify_one();
    }

    /// Cancels a registration; its callback will not be invoked again.
    pub fn remove_io(&self, handle: IoHandle) {
        handle.cancel();
    }

    /// Requests that [`Reactor::run`] return `code` once the current
    /// callback (if any) finishes and control returns to the loop.
    pub fn quit(&self, code: i32) {
        self.inner.quit_code.set(Some(code));
        self.inner.wake.notify_one();
    }

    /// Drives the loop until [`Reactor::quit`] is called, dispatching timers
    /// and pending jobs (I/O sources dispatch themselves via their own
    /// tasks, see [`Reactor::add_io`]). Returns the quit code.
    pub async fn run_until_quit(&self) -> i32 {
        loop {
            // Drain first: jobs set by the caller before entering the loop,
            // or by the previous iteration's timer callbacks, run before we
            // consider the next external event.
            self.inner.pending.drain();
            if let Some(code) = self.inner.quit_code.get() {
                return code;
            }

            let deadline = self.inner.timers.borrow_mut().peek_deadline();
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline.into()) => {}
                        _ = self.inner.wake.notified() => {}
                    }
                }
                None => {
                    self.inner.wake.notified().await;
                }
            }

            if let Some(code) = self.inner.quit_code.get() {
                return code;
            }

            let due = self.inner.timers.borrow_mut().pop_due(Instant::now());
            for cb in due {
                (cb.borrow_mut())();
            }
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
