//! FragmentProto (spec §4.E, §6): splits a frame larger than the outbound
//! carrier MTU into chunks, and reassembles chunks back into a frame on the
//! receive side.
//!
//! Wire layout per chunk: `frame_id: u16 LE, chunk_start: u16 LE,
//! chunk_len: u16 LE, is_last: u8, data: bytes[chunk_len]`.

use crate::flow::packet_pass::{DoneCallback, PacketPass};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

pub const FRAGMENTPROTO_HEADER_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentChunk {
    pub frame_id: u16,
    pub chunk_start: u16,
    pub chunk_len: u16,
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl FragmentChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAGMENTPROTO_HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.frame_id.to_le_bytes());
        out.extend_from_slice(&self.chunk_start.to_le_bytes());
        out.extend_from_slice(&self.chunk_len.to_le_bytes());
        out.push(self.is_last as u8);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<FragmentChunk> {
        if bytes.len() < FRAGMENTPROTO_HEADER_LEN {
            return None;
        }
        let frame_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let chunk_start = u16::from_le_bytes([bytes[2], bytes[3]]);
        let chunk_len = u16::from_le_bytes([bytes[4], bytes[5]]);
        let is_last = bytes[6] != 0;
        let data = &bytes[FRAGMENTPROTO_HEADER_LEN..];
        if data.len() != chunk_len as usize {
            return None;
        }
        Some(FragmentChunk {
            frame_id,
            chunk_start,
            chunk_len,
            is_last,
            data: data.to_vec(),
        })
    }
}

/// Splits `frame` into chunks no larger than `carrier_mtu - FRAGMENTPROTO_HEADER_LEN`
/// each, tagged with `frame_id`. `off` is monotonically increasing and
/// `is_last` is set on exactly the final chunk. Latency-based coalescing of a
/// short trailing chunk (spec's "configurable latency") is the caller's
/// concern — a latency of 0 (flush immediately) is what this function gives,
/// since it emits the whole schedule eagerly.
pub fn disassemble(frame: &[u8], carrier_mtu: usize, frame_id: u16) -> Vec<FragmentChunk> {
    assert!(carrier_mtu > FRAGMENTPROTO_HEADER_LEN, "carrier_mtu too small to carry any payload");
    let payload_cap = carrier_mtu - FRAGMENTPROTO_HEADER_LEN;
    if frame.is_empty() {
        return vec![FragmentChunk {
            frame_id,
            chunk_start: 0,
            chunk_len: 0,
            is_last: true,
            data: Vec::new(),
        }];
    }
    let mut chunks = Vec::new();
    let mut off = 0usize;
    while off < frame.len() {
        let len = payload_cap.min(frame.len() - off);
        let is_last = off + len == frame.len();
        chunks.push(FragmentChunk {
            frame_id,
            chunk_start: off as u16,
            chunk_len: len as u16,
            is_last,
            data: frame[off..off + len].to_vec(),
        });
        off += len;
    }
    chunks
}

/// A single reassembly slot. `time` is the pool-wide monotonic counter value
/// at the slot's most recent chunk, used to pick the oldest slot for
/// eviction when the pool is full (spec §4.E point 2).
struct Slot {
    frame_id: u16,
    time: u64,
    length: Option<usize>,
    /// (start, data), kept sorted and non-overlapping by construction of the
    /// disassembler; merged to check full coverage of `[0, length)`.
    pieces: Vec<(usize, Vec<u8>)>,
}

impl Slot {
    fn covers_whole_frame(&self) -> bool {
        let Some(length) = self.length else {
            return false;
        };
        if length == 0 {
            return true;
        }
        let mut sorted: Vec<&(usize, Vec<u8>)> = self.pieces.iter().collect();
        sorted.sort_by_key(|(start, _)| *start);
        let mut covered_end = 0usize;
        for (start, data) in sorted {
            if *start > covered_end {
                return false;
            }
            covered_end = covered_end.max(start + data.len());
        }
        covered_end >= length
    }

    fn assemble(&self) -> Vec<u8> {
        let length = self.length.expect("assemble called before length known");
        let mut out = vec![0u8; length];
        for (start, data) in &self.pieces {
            out[*start..*start + data.len()].copy_from_slice(data);
        }
        out
    }
}

/// Bounded-pool chunk reassembler. Holds at most `num_frames` slots, each
/// tolerating up to `num_chunks` distinct chunk arrivals. Frames that never
/// complete (slot evicted, or pool exhausted) are silently counted as
/// dropped — no event is emitted for them (spec §7 `FragmentPool`).
pub struct Assembler {
    num_frames: usize,
    num_chunks: usize,
    slots: Vec<Option<Slot>>,
    clock: u64,
    dropped: Cell<u64>,
}

impl Assembler {
    pub fn new(num_frames: usize, num_chunks: usize) -> Self {
        assert!(num_frames >= 1 && num_chunks >= 1);
        Assembler {
            num_frames,
            num_chunks,
            slots: (0..num_frames).map(|_| None).collect(),
            clock: 0,
            dropped: Cell::new(0),
        }
    }

    /// Out-of-order interleaving tolerance guaranteed to reassemble, per
    /// spec §4.E: `D = num_frames - 2`.
    pub fn tolerance(&self) -> usize {
        self.num_frames.saturating_sub(2)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.get()
    }

    /// Feeds one chunk in. Returns the reassembled frame once its chunks
    /// exactly cover `[0, length)`.
    pub fn accept(&mut self, chunk: FragmentChunk) -> Option<Vec<u8>> {
        self.clock += 1;
        let time = self.clock;

        let slot_idx = self.slots.iter().position(|s| {
            s.as_ref()
                .map(|s| s.frame_id == chunk.frame_id)
                .unwrap_or(false)
        });

        let slot_idx = match slot_idx {
            Some(idx) => idx,
            None => self.allocate_slot(chunk.frame_id, time),
        };

        let slot = self.slots[slot_idx].as_mut().expect("slot just allocated");
        if slot.pieces.len() >= self.num_chunks {
            // Slot is full of un-coalesced chunks; count and drop this one.
            self.dropped.set(self.dropped.get() + 1);
            return None;
        }
        slot.time = time;
        if chunk.is_last {
            slot.length = Some(chunk.chunk_start as usize + chunk.chunk_len as usize);
        }
        slot.pieces.push((chunk.chunk_start as usize, chunk.data));

        if slot.covers_whole_frame() {
            let frame = slot.assemble();
            self.slots[slot_idx] = None;
            Some(frame)
        } else {
            None
        }
    }

    fn allocate_slot(&mut self, frame_id: u16, time: u64) -> usize {
        if let Some(free) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[free] = Some(Slot {
                frame_id,
                time,
                length: None,
                pieces: Vec::new(),
            });
            return free;
        }
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.as_ref().map(|s| s.time).unwrap_or(0))
            .map(|(idx, _)| idx)
            .expect("pool has at least one slot");
        self.dropped.set(self.dropped.get() + 1);
        self.slots[oldest] = Some(Slot {
            frame_id,
            time,
            length: None,
            pieces: Vec::new(),
        });
        oldest
    }
}

/// Splits each frame handed to `send` into chunks and forwards them
/// downstream one at a time, firing the original `done` once every chunk for
/// that frame has been accepted.
pub struct Disassembler<D> {
    shared: Rc<DisassemblerShared<D>>,
}

struct DisassemblerShared<D> {
    downstream: RefCell<D>,
    carrier_mtu: usize,
    next_frame_id: Cell<u16>,
    queue: RefCell<VecDeque<(Vec<u8>, Option<DoneCallback>)>>,
    driving: Cell<bool>,
}

impl<D: PacketPass + 'static> Disassembler<D> {
    pub fn new(downstream: D, carrier_mtu: usize) -> Self {
        Disassembler {
            shared: Rc::new(DisassemblerShared {
                downstream: RefCell::new(downstream),
                carrier_mtu,
                next_frame_id: Cell::new(0),
                queue: RefCell::new(VecDeque::new()),
                driving: Cell::new(false),
            }),
        }
    }
}

impl<D: PacketPass + 'static> PacketPass for Disassembler<D> {
    fn mtu(&self) -> usize {
        usize::MAX
    }

    fn send(&mut self, data: Vec<u8>, done: DoneCallback) {
        let frame_id = self.shared.next_frame_id.get();
        self.shared.next_frame_id.set(frame_id.wrapping_add(1));
        let chunks = disassemble(&data, self.shared.carrier_mtu, frame_id);
        let last_idx = chunks.len() - 1;
        let mut queue = self.shared.queue.borrow_mut();
        let mut done = Some(done);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let encoded = chunk.encode();
            let chunk_done = if i == last_idx { done.take() } else { None };
            queue.push_back((encoded, chunk_done));
        }
        drop(queue);
        drive(&self.shared);
    }
}

fn drive<D: PacketPass + 'static>(shared: &Rc<DisassemblerShared<D>>) {
    if shared.driving.replace(true) {
        return;
    }
    loop {
        let next = shared.queue.borrow_mut().pop_front();
        let Some((encoded, done)) = next else { break };
        let weak: Weak<DisassemblerShared<D>> = Rc::downgrade(shared);
        let fired = Rc::new(Cell::new(false));
        let fired_cb = fired.clone();
        shared.downstream.borrow_mut().send(
            encoded,
            Box::new(move || {
                fired_cb.set(true);
                if let Some(done) = done {
                    done();
                }
                if let Some(shared) = weak.upgrade() {
                    drive(&shared);
                }
            }),
        );
        if !fired.get() {
            // Downstream will call `done` later; the resumed `drive` call it
            // triggers will continue draining the queue.
            break;
        }
    }
    shared.driving.set(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassemble_then_assemble_round_trips() {
        let frame: Vec<u8> = (0..1400u32).map(|i| (i % 256) as u8).collect();
        let chunks = disassemble(&frame, 500, 7);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0..2].iter().all(|c| !c.is_last));
        assert!(chunks[2].is_last);

        let mut assembler = Assembler::new(4, 8);
        let mut out = None;
        for chunk in chunks {
            if let Some(frame_out) = assembler.accept(chunk) {
                out = Some(frame_out);
            }
        }
        assert_eq!(out, Some(frame));
    }

    #[test]
    fn assembler_tolerates_reordering_within_window() {
        let frame: Vec<u8> = (0..1400u32).map(|i| (i % 256) as u8).collect();
        let mut chunks = disassemble(&frame, 500, 1);
        chunks.reverse();

        let mut assembler = Assembler::new(4, 8);
        let mut out = None;
        for chunk in chunks {
            if let Some(frame_out) = assembler.accept(chunk) {
                out = Some(frame_out);
            }
        }
        assert_eq!(out, Some(frame));
    }

    #[test]
    fn pool_exhaustion_evicts_oldest_slot_and_counts_drop() {
        let mut assembler = Assembler::new(2, 8);
        // Start two frames, neither complete.
        assembler.accept(FragmentChunk {
            frame_id: 1,
            chunk_start: 0,
            chunk_len: 4,
            is_last: false,
            data: vec![1, 1, 1, 1],
        });
        assembler.accept(FragmentChunk {
            frame_id: 2,
            chunk_start: 0,
            chunk_len: 4,
            is_last: false,
            data: vec![2, 2, 2, 2],
        });
        // A third, new frame forces eviction of the oldest (frame_id 1).
        assembler.accept(FragmentChunk {
            frame_id: 3,
            chunk_start: 0,
            chunk_len: 4,
            is_last: false,
            data: vec![3, 3, 3, 3],
        });
        assert_eq!(assembler.dropped_count(), 1);
    }

    #[test]
    fn empty_frame_disassembles_to_one_zero_length_last_chunk() {
        let chunks = disassemble(&[], 500, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_last);
        assert_eq!(chunks[0].chunk_len, 0);
    }

    #[test]
    fn chunk_wire_round_trip() {
        let chunk = FragmentChunk {
            frame_id: 42,
            chunk_start: 10,
            chunk_len: 3,
            is_last: true,
            data: vec![1, 2, 3],
        };
        let encoded = chunk.encode();
        assert_eq!(FragmentChunk::decode(&encoded), Some(chunk));
    }

    #[test]
    fn disassembler_pushes_every_chunk_downstream_in_order() {
        use crate::flow::packet_pass::test_support::RecordingSink;

        let sink = RecordingSink::new(1500);
        let received = sink.received.clone();
        let mut disassembler = Disassembler::new(sink, 500);

        let frame: Vec<u8> = (0..1400u32).map(|i| (i % 256) as u8).collect();
        let done_fired = Rc::new(Cell::new(false));
        let done_cb = done_fired.clone();
        disassembler.send(frame, Box::new(move || done_cb.set(true)));

        assert!(done_fired.get());
        assert_eq!(received.borrow().len(), 3);
        let decoded: Vec<FragmentChunk> = received
            .borrow()
            .iter()
            .map(|bytes| FragmentChunk::decode(bytes).unwrap())
            .collect();
        assert!(decoded[2].is_last);
    }
}
