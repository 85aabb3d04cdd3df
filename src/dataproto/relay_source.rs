//! RelaySource (spec §4.K): per-(source peer, *many* destination peers)
//! fan-out. Keyed by destination, each entry is just a [`LocalSource`]
//! addressed `from=source, to=destination` — relaying is local routing with
//! the destination chosen per frame instead of fixed at construction.

use super::local_source::LocalSource;
use crate::flow::packet_pass::PacketPass;
use crate::peer::PeerId;
use crate::reactor::Reactor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

struct Inner<F: PacketPass + 'static> {
    reactor: Reactor,
    local_id: PeerId,
    mtu: usize,
    default_buffer_capacity: usize,
    inactivity_time: Option<Duration>,
    attach: RefCell<Box<dyn FnMut(PeerId) -> Option<F>>>,
    relays: RefCell<HashMap<PeerId, LocalSource<F>>>,
}

/// Cheap to clone; clones share the same relay-flow map.
pub struct RelaySource<F: PacketPass + 'static> {
    inner: Rc<Inner<F>>,
}

impl<F: PacketPass + 'static> Clone for RelaySource<F> {
    fn clone(&self) -> Self {
        RelaySource { inner: self.inner.clone() }
    }
}

impl<F: PacketPass + 'static> RelaySource<F> {
    /// `attach` is asked, at most once per distinct destination, for the
    /// flow to bind that destination's relay to; a `None` leaves the relay
    /// buffering unattached (it will never drain until something later
    /// calls [`RelaySource`]'s owner to retry, which this type does not do
    /// on its own — a deliberate narrowing, since `RelaySource` has no
    /// standing reference to whatever registry of destinations owns that
    /// decision).
    pub fn new(
        reactor: Reactor,
        local_id: PeerId,
        mtu: usize,
        default_buffer_capacity: usize,
        inactivity_time: Option<Duration>,
        attach: impl FnMut(PeerId) -> Option<F> + 'static,
    ) -> Self {
        RelaySource {
            inner: Rc::new(Inner {
                reactor,
                local_id,
                mtu,
                default_buffer_capacity,
                inactivity_time,
                attach: RefCell::new(Box::new(attach)),
                relays: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Enqueues `frame` for relaying to `dest`, creating that relay's flow
    /// (capacity `buffer_num_packets`, or the default if zero) on first use.
    pub fn submit(&self, dest: PeerId, frame: &[u8], buffer_num_packets: usize) {
        if !self.inner.relays.borrow().contains_key(&dest) {
            let weak = Rc::downgrade(&self.inner);
            let on_inactive: Box<dyn FnMut()> = Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Some(flow) = inner.relays.borrow_mut().remove(&dest) {
                        flow.detach();
                    }
                }
            });
            let inactivity = self.inner.inactivity_time.map(|d| (d, on_inactive));
            let capacity = if buffer_num_packets > 0 {
                buffer_num_packets
            } else {
                self.inner.default_buffer_capacity
            };
            let flow = LocalSource::new(self.inner.reactor.clone(), self.inner.local_id, dest, capacity, self.inner.mtu, inactivity);
            if let Some(downstream) = (self.inner.attach.borrow_mut())(dest) {
                flow.attach(downstream);
            }
            self.inner.relays.borrow_mut().insert(dest, flow);
        }

        let relays = self.inner.relays.borrow();
        relays.get(&dest).expect("just inserted or already present").route(frame, false);
    }

    /// True once every relay flow has been released.
    pub fn is_empty(&self) -> bool {
        self.inner.relays.borrow().is_empty()
    }

    /// Releases every relay flow from its destination. Callers must not
    /// invoke this while any destination this source relays to is in its
    /// own *freeing* state — use [`Self::free_release`] for teardown, since
    /// a plain `release` synchronously cancels in-flight sends through
    /// `detach`, which a freeing destination does not expect.
    pub fn release(&self) {
        for (_, flow) in self.inner.relays.borrow_mut().drain() {
            flow.detach();
        }
    }

    /// Teardown variant: drops every relay flow without detaching, since a
    /// destination already freeing will reclaim them itself.
    pub fn free_release(&self) {
        self.inner.relays.borrow_mut().clear();
    }
}
