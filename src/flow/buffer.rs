//! `Buffer`: a bounded FIFO of up to `N` packets, [`PacketPass`] in,
//! [`PacketRecv`] out (spec §4.D). `SinglePacketBuffer` is `Buffer` with
//! capacity 1.
//!
//! Packets offered while the buffer is at capacity are dropped and counted
//! rather than rejected outright — this is the general mechanism that
//! `dataproto::local_source`'s `RouteBuffer` relies on for boundary
//! behavior #9 in spec §8 ("sending `NumPackets+1` drops it and counts").

use super::packet_pass::{DoneCallback, PacketPass};
use super::packet_recv::{PacketRecv, RecvDoneCallback};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub struct Buffer {
    mtu: usize,
    capacity: usize,
    queue: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pending_recv: Rc<RefCell<Option<RecvDoneCallback>>>,
    dropped: Rc<Cell<u64>>,
}

impl Buffer {
    pub fn new(mtu: usize, capacity: usize) -> Self {
        assert!(capacity > 0, "Buffer capacity must be > 0");
        Buffer {
            mtu,
            capacity,
            queue: Rc::new(RefCell::new(VecDeque::with_capacity(capacity))),
            pending_recv: Rc::new(RefCell::new(None)),
            dropped: Rc::new(Cell::new(0)),
        }
    }

    /// `Buffer` with capacity exactly 1 (`SinglePacketBuffer`).
    pub fn single(mtu: usize) -> Self {
        Buffer::new(mtu, 1)
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Count of packets dropped because the buffer was full when offered.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.get()
    }
}

impl PacketPass for Buffer {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        let mut pending_taken = None;
        {
            let queue = self.queue.borrow();
            if queue.is_empty() {
                pending_taken = self.pending_recv.borrow_mut().take();
            }
        }
        if let Some(recv_done) = pending_taken {
            recv_done(data);
        } else if self.queue.borrow().len() >= self.capacity {
            self.dropped.set(self.dropped.get() + 1);
        } else {
            self.queue.borrow_mut().push_back(data);
        }
        done();
    }
}

impl PacketRecv for Buffer {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn recv(&mut self, done: RecvDoneCallback) {
        let front = self.queue.borrow_mut().pop_front();
        match front {
            Some(data) => done(data),
            None => *self.pending_recv.borrow_mut() = Some(done),
        }
    }
}
