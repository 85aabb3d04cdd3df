//! Packet queues (spec §4.F): multiplexers that merge several flows, each a
//! [`crate::flow::PacketPass`] input, onto one shared downstream.

pub mod fair_queue;
pub mod priority_queue;
