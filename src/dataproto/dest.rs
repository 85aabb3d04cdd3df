//! DataProtoDest (spec §4.I): the per-peer send pipeline —
//! `FairQueue -> InactivityMonitor(keep_alive) -> Notifier -> output` — plus
//! the `up`/`down` liveness state machine driven by what the receive side
//! observes about this peer.

use crate::codec::dataproto::{encode_datagram, DataProtoHeader};
use crate::flow::blocker::Blocker;
use crate::flow::notifier::Notifier;
use crate::flow::packet_pass::PacketPass;
use crate::flow::packet_recv::PacketRecv;
use crate::liveness::inactivity_monitor::InactivityMonitor;
use crate::liveness::keepalive_source::KeepAliveSource;
use crate::pending::PendingJob;
use crate::peer::PeerId;
use crate::queue::fair_queue::{FairQueue, FairQueueInput};
use crate::reactor::timer::Timer;
use crate::reactor::Reactor;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

type Output<D> = InactivityMonitor<Notifier<D>>;

/// The flow handle a `LocalSource`/relay flow attaches to in order to send
/// routed frames through this destination's fair queue.
pub type DestFlow<D> = FairQueueInput<Output<D>>;

struct Inner<D> {
    reactor: Reactor,
    local_id: PeerId,
    peer_id: PeerId,
    queue: FairQueue<Output<D>>,
    keepalive_flow: RefCell<DestFlow<D>>,
    keepalive: RefCell<Blocker<KeepAliveSource>>,
    up_report: Cell<bool>,
    observed_up: Cell<bool>,
    freeing: Cell<bool>,
    tolerance: Duration,
    recv_timer: Timer,
    last_recv_is_live: Cell<bool>,
    handler: RefCell<Box<dyn FnMut(bool)>>,
    recompute_job: RefCell<Option<PendingJob>>,
}

/// Owns one peer's outbound send pipeline. Cheap to clone; clones share the
/// same pipeline (`Rc`-backed), matching `LocalSource`/`RelaySource`'s need
/// to each hold a reference to the same destination.
pub struct DataProtoDest<D> {
    inner: Rc<Inner<D>>,
}

impl<D> Clone for DataProtoDest<D> {
    fn clone(&self) -> Self {
        DataProtoDest {
            inner: self.inner.clone(),
        }
    }
}

impl<D: PacketPass + 'static> DataProtoDest<D> {
    pub fn init(
        reactor: Reactor,
        local_id: PeerId,
        peer_id: PeerId,
        output: D,
        keep_alive: Duration,
        tolerance: Duration,
        handler: impl FnMut(bool) + 'static,
    ) -> Self {
        let mtu = output.mtu();
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<Inner<D>>| {
            let expiry_weak = weak.clone();
            let monitor = InactivityMonitor::new(
                Notifier::new(output, |_data| {}),
                reactor.clone(),
                keep_alive,
                move || {
                    if let Some(inner) = expiry_weak.upgrade() {
                        Inner::on_idle_for_keepalive(&inner);
                    }
                },
            );
            let queue = FairQueue::new(monitor);
            // Registered first but scheduled no differently from any other
            // flow: this fair queue has no static-priority concept (that's
            // `PriorityQueue`), so "lowest priority" for the keep-alive flow
            // is approximated by fair virtual-time scheduling rather than a
            // hard guarantee, since keep-alives are rare relative to data.
            let keepalive_flow = queue.add_flow();

            let recv_weak = weak.clone();
            let recv_timer = reactor.new_timer(move || {
                if let Some(inner) = recv_weak.upgrade() {
                    Inner::on_receive_timeout(&inner);
                }
            });

            Inner {
                reactor,
                local_id,
                peer_id,
                queue,
                keepalive_flow: RefCell::new(keepalive_flow),
                keepalive: RefCell::new(Blocker::new(KeepAliveSource::new(mtu), true)),
                up_report: Cell::new(false),
                observed_up: Cell::new(false),
                freeing: Cell::new(false),
                tolerance,
                recv_timer,
                last_recv_is_live: Cell::new(false),
                handler: RefCell::new(Box::new(handler)),
                recompute_job: RefCell::new(None),
            }
        });

        let job_weak = Rc::downgrade(&inner);
        let job = PendingJob::new(&inner.reactor.pending_group(), move || {
            if let Some(inner) = job_weak.upgrade() {
                Inner::recompute_up(&inner);
            }
        });
        *inner.recompute_job.borrow_mut() = Some(job);

        Inner::request_keepalive(&inner);
        DataProtoDest { inner }
    }

    /// Registers a new flow on this destination's fair queue, for a
    /// `LocalSource` or relay flow to attach to.
    pub fn add_flow(&self) -> DestFlow<D> {
        self.inner.queue.add_flow()
    }

    /// Called whenever a packet from this peer arrives on the receive side.
    pub fn received(&self, peer_receiving: bool) {
        self.inner.reactor.set_timer(&self.inner.recv_timer, self.inner.tolerance);
        self.inner.last_recv_is_live.set(true);
        self.inner.up_report.set(peer_receiving);
        Inner::schedule_recompute(&self.inner);
    }

    /// Transitions to *freeing*: attached sources may now detach without
    /// triggering an output cancel.
    pub fn prepare_free(&self) {
        self.inner.freeing.set(true);
    }

    pub fn is_freeing(&self) -> bool {
        self.inner.freeing.get()
    }

    pub fn up(&self) -> bool {
        self.inner.observed_up.get()
    }

    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }
}

impl<D: PacketPass + 'static> Inner<D> {
    fn schedule_recompute(inner: &Rc<Inner<D>>) {
        if let Some(job) = inner.recompute_job.borrow().as_ref() {
            job.set();
        }
    }

    fn recompute_up(inner: &Rc<Inner<D>>) {
        let new_up = inner.up_report.get() && inner.last_recv_is_live.get();
        if new_up != inner.observed_up.get() {
            inner.observed_up.set(new_up);
            tracing::debug!(peer = inner.peer_id.value(), up = new_up, "dataproto dest liveness changed");
            (inner.handler.borrow_mut())(new_up);
        }
    }

    fn on_receive_timeout(inner: &Rc<Inner<D>>) {
        tracing::debug!(peer = inner.peer_id.value(), "dataproto dest receive tolerance expired");
        inner.last_recv_is_live.set(false);
        Inner::recompute_up(inner);
    }

    fn on_idle_for_keepalive(inner: &Rc<Inner<D>>) {
        inner.keepalive.borrow_mut().set_blocked(false);
    }

    fn request_keepalive(inner: &Rc<Inner<D>>) {
        let weak = Rc::downgrade(inner);
        inner.keepalive.borrow_mut().recv(Box::new(move |payload| {
            if let Some(inner) = weak.upgrade() {
                Inner::send_keepalive(&inner, payload);
            }
        }));
    }

    fn send_keepalive(inner: &Rc<Inner<D>>, payload: Vec<u8>) {
        // RECEIVING_KEEPALIVES is a self-report: "have I heard from you
        // recently", not our derived up/down verdict about the link.
        let header = DataProtoHeader {
            receiving_keepalives: inner.last_recv_is_live.get(),
            from_id: inner.local_id,
            to_ids: vec![inner.peer_id],
        };
        let datagram = encode_datagram(&header, &payload);
        let weak = Rc::downgrade(inner);
        inner.keepalive_flow.borrow_mut().send(
            datagram,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.keepalive.borrow_mut().set_blocked(true);
                    Inner::request_keepalive(&inner);
                }
            }),
        );
    }
}
