//! Inactivity monitor and keep-alive source (spec §4.G): the two halves of
//! per-peer liveness tracking.

pub mod inactivity_monitor;
pub mod keepalive_source;
