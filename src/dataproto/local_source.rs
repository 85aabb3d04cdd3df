//! LocalSource (spec §4.J): the per-(local, remote) peer route buffer that
//! feeds one flow on a [`super::dest::DataProtoDest`]'s fair queue.

use crate::codec::dataproto::{encode_datagram, DataProtoHeader};
use crate::flow::buffer::Buffer;
use crate::flow::packet_pass::PacketPass;
use crate::flow::packet_recv::PacketRecv;
use crate::peer::PeerId;
use crate::reactor::timer::Timer;
use crate::reactor::Reactor;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

struct Inner<F: PacketPass + 'static> {
    local_id: PeerId,
    remote_id: PeerId,
    buffer: RefCell<Buffer>,
    attached: RefCell<Option<F>>,
    in_flight: Cell<bool>,
    pumping: Cell<bool>,
    reactor: Reactor,
    inactivity_time: Option<Duration>,
    inactivity_timer: RefCell<Option<Timer>>,
    on_inactive: RefCell<Option<Box<dyn FnMut()>>>,
}

/// Cheap to clone; clones share the same buffer and attachment state.
pub struct LocalSource<F: PacketPass + 'static> {
    inner: Rc<Inner<F>>,
}

impl<F: PacketPass + 'static> Clone for LocalSource<F> {
    fn clone(&self) -> Self {
        LocalSource {
            inner: self.inner.clone(),
        }
    }
}

impl<F: PacketPass + 'static> LocalSource<F> {
    pub fn new(
        reactor: Reactor,
        local_id: PeerId,
        remote_id: PeerId,
        buffer_capacity: usize,
        mtu: usize,
        inactivity: Option<(Duration, Box<dyn FnMut()>)>,
    ) -> Self {
        let (inactivity_time, on_inactive) = match inactivity {
            Some((d, h)) => (Some(d), Some(h)),
            None => (None, None),
        };
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<Inner<F>>| {
            let timer_weak = weak.clone();
            let timer = if inactivity_time.is_some() {
                Some(reactor.new_timer(move || {
                    if let Some(inner) = timer_weak.upgrade() {
                        Inner::on_inactive_timeout(&inner);
                    }
                }))
            } else {
                None
            };
            Inner {
                local_id,
                remote_id,
                buffer: RefCell::new(Buffer::new(mtu, buffer_capacity)),
                attached: RefCell::new(None),
                in_flight: Cell::new(false),
                pumping: Cell::new(false),
                reactor,
                inactivity_time,
                inactivity_timer: RefCell::new(timer),
                on_inactive: RefCell::new(on_inactive),
            }
        });
        LocalSource { inner }
    }

    /// Appends `frame` (with a DataProto header `from=local, to=remote`
    /// prepended) to the route buffer, or drops it silently (and counts) if
    /// full. `more=false` marks the last `route` call for the frame
    /// currently being dispatched by the router.
    pub fn route(&self, frame: &[u8], more: bool) {
        let _ = more;
        let header = DataProtoHeader {
            receiving_keepalives: false,
            from_id: self.inner.local_id,
            to_ids: vec![self.inner.remote_id],
        };
        let datagram = encode_datagram(&header, frame);
        self.inner.buffer.borrow_mut().send(datagram, Box::new(|| {}));
        Inner::refresh_inactivity(&self.inner);
        Inner::pump(&self.inner);
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.buffer.borrow().dropped_count()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.borrow().is_some()
    }

    /// Binds this source's route buffer to a flow on a destination.
    pub fn attach(&self, flow: F) {
        assert!(!self.is_attached(), "LocalSource::attach called while already attached");
        *self.inner.attached.borrow_mut() = Some(flow);
        Inner::pump(&self.inner);
    }

    /// Unbinds the flow. If a packet from this source was in flight, the
    /// flow is released, which cancels it and drops it from the
    /// destination's scheduler. Buffered-but-unsent frames are kept, should
    /// this source later attach to a new destination.
    pub fn detach(&self) {
        let flow = self.inner.attached.borrow_mut().take();
        if let Some(flow) = flow {
            if self.inner.in_flight.get() {
                flow.release();
                self.inner.in_flight.set(false);
            }
        }
    }
}

impl<F: PacketPass + 'static> Inner<F> {
    fn pump(inner: &Rc<Inner<F>>) {
        if inner.pumping.replace(true) {
            return;
        }
        loop {
            if inner.in_flight.get() || inner.attached.borrow().is_none() || inner.buffer.borrow().is_empty() {
                break;
            }
            let got: Rc<RefCell<Option<Vec<u8>>>> = Rc::new(RefCell::new(None));
            let got_cb = got.clone();
            inner.buffer.borrow_mut().recv(Box::new(move |data| *got_cb.borrow_mut() = Some(data)));
            let Some(data) = got.borrow_mut().take() else {
                break;
            };

            inner.in_flight.set(true);
            let weak = Rc::downgrade(inner);
            let fired = Rc::new(Cell::new(false));
            let fired_cb = fired.clone();
            inner
                .attached
                .borrow_mut()
                .as_mut()
                .expect("checked attached above")
                .send(
                    data,
                    Box::new(move || {
                        fired_cb.set(true);
                        if let Some(inner) = weak.upgrade() {
                            inner.in_flight.set(false);
                            Inner::refresh_inactivity(&inner);
                            Inner::pump(&inner);
                        }
                    }),
                );
            if !fired.get() {
                break;
            }
        }
        inner.pumping.set(false);
    }

    fn refresh_inactivity(inner: &Rc<Inner<F>>) {
        let Some(duration) = inner.inactivity_time else {
            return;
        };
        let timer_slot = inner.inactivity_timer.borrow();
        let Some(timer) = timer_slot.as_ref() else {
            return;
        };
        if inner.buffer.borrow().is_empty() {
            inner.reactor.clear_timer(timer);
        } else {
            inner.reactor.set_timer(timer, duration);
        }
    }

    fn on_inactive_timeout(inner: &Rc<Inner<F>>) {
        if let Some(handler) = inner.on_inactive.borrow_mut().as_mut() {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::dataproto::DataProtoHeader;
    use crate::queue::fair_queue::{FairQueue, FairQueueInput};
    use std::cell::RefCell as StdRefCell;

    #[derive(Default)]
    struct RecordingSink {
        received: Rc<StdRefCell<Vec<Vec<u8>>>>,
    }
    impl PacketPass for RecordingSink {
        fn mtu(&self) -> usize {
            1500
        }
        fn send(&mut self, data: Vec<u8>, done: crate::flow::packet_pass::DoneCallback) {
            self.received.borrow_mut().push(data);
            done();
        }
    }

    #[tokio::test]
    async fn routed_frame_reaches_the_attached_flow_with_header_prepended() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let reactor = Reactor::new();
                let sink = RecordingSink::default();
                let received = sink.received.clone();
                let queue = FairQueue::new(sink);
                let flow = queue.add_flow();

                let source: LocalSource<FairQueueInput<RecordingSink>> =
                    LocalSource::new(reactor, PeerId(1), PeerId(2), 4, 1500, None);
                source.attach(flow);
                source.route(&[0xaa, 0xbb], false);

                let received_ref = received.borrow();
                let (header, payload) = DataProtoHeader::decode(&received_ref[0]).unwrap();
                assert_eq!(header.from_id, PeerId(1));
                assert_eq!(header.to_ids, vec![PeerId(2)]);
                assert_eq!(payload, &[0xaa, 0xbb]);
            })
            .await;
    }

    #[tokio::test]
    async fn detach_before_attach_has_no_flow_to_release() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let reactor = Reactor::new();
                let source: LocalSource<FairQueueInput<RecordingSink>> =
                    LocalSource::new(reactor, PeerId(1), PeerId(2), 4, 1500, None);
                source.detach();
                assert!(!source.is_attached());
            })
            .await;
    }

    #[tokio::test]
    async fn buffer_full_drops_and_counts_without_panicking() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let reactor = Reactor::new();
                let source: LocalSource<FairQueueInput<RecordingSink>> =
                    LocalSource::new(reactor, PeerId(1), PeerId(2), 1, 1500, None);
                source.route(&[1], false);
                source.route(&[2], false); // no attached flow yet: buffer fills, then overflows
                assert_eq!(source.dropped_count(), 1);
            })
            .await;
    }
}
