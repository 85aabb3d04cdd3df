//! Scoped-lifetime guard: detects whether a watched object was freed during
//! an outcall to user code (the "dead-token"/`DEAD_ENTER` idiom in the
//! original, §4.C and §9).
//!
//! Every object that can be destroyed from inside a callback it invokes
//! carries a [`Liveness`] cell. Before making an outcall, the caller takes a
//! [`DeadToken`] snapshot; after the outcall returns, it asks the token
//! whether the object is still alive. A `false` answer means the callback
//! dropped the object (or something holding it), and the caller must return
//! immediately without touching it again.

use std::cell::Cell;
use std::rc::{Rc, Weak};

/// Owned by the object being watched. Incremented once, in `Drop`.
#[derive(Default)]
pub struct Liveness {
    alive: Rc<Cell<bool>>,
}

impl Liveness {
    pub fn new() -> Self {
        Liveness {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Takes a snapshot to compare against after an outcall.
    pub fn token(&self) -> DeadToken {
        DeadToken {
            alive: Rc::downgrade(&self.alive),
        }
    }
}

impl Drop for Liveness {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

/// A snapshot taken before an outcall. `is_alive()` after the outcall
/// returns tells the caller whether it is still safe to touch the watched
/// object.
pub struct DeadToken {
    alive: Weak<Cell<bool>>,
}

impl DeadToken {
    /// True iff the watched object has not been dropped since this token was
    /// taken. A dangling weak reference (the `Liveness` itself was dropped,
    /// not merely marked dead) also reports `false`.
    pub fn is_alive(&self) -> bool {
        self.alive.upgrade().map(|c| c.get()).unwrap_or(false)
    }
}

/// Runs `outcall`, then evaluates `after` only if the watched object
/// survived. Returns `None` if the object died during the outcall, matching
/// the "caller must return immediately" rule in spec §4.C / invariant 6.
pub fn guarded_outcall<T, R>(liveness: &Liveness, outcall: impl FnOnce() -> T, after: impl FnOnce(T) -> R) -> Option<R> {
    let token = liveness.token();
    let result = outcall();
    if token.is_alive() {
        Some(after(result))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_when_not_dropped() {
        let liveness = Liveness::new();
        let token = liveness.token();
        assert!(token.is_alive());
        drop(liveness);
        assert!(!token.is_alive());
    }

    #[test]
    fn guarded_outcall_detects_self_destruction() {
        struct Owner {
            liveness: Liveness,
        }
        let owner = Rc::new(std::cell::RefCell::new(Some(Owner {
            liveness: Liveness::new(),
        })));

        // Clone the underlying `alive` cell out of a short borrow and drop
        // that borrow immediately. Passing `&owner.borrow()...liveness`
        // straight into the call below would keep that `Ref` alive for the
        // whole statement (including while the outcall runs), and the
        // outcall's `borrow_mut()` on the same `RefCell` would panic.
        let liveness_for_call = {
            let owner_ref = owner.borrow();
            Liveness {
                alive: owner_ref.as_ref().unwrap().liveness.alive.clone(),
            }
        };
        let liveness_token = liveness_for_call.token();

        let owner_for_cb = owner.clone();
        let ran_after = guarded_outcall(
            &liveness_for_call,
            || {
                // Callback frees the owner, simulating "self destroyed
                // during an outcall".
                *owner_for_cb.borrow_mut() = None;
            },
            |_| "after ran",
        );

        assert!(ran_after.is_none());
        assert!(!liveness_token.is_alive());
    }
}
