//! Flow framework (spec §4.D): the uniform producer/consumer contracts every
//! data-plane module is built from.
//!
//! Two sibling interfaces — [`packet_pass::PacketPass`] (push, producer to
//! consumer) and [`packet_recv::PacketRecv`] (pull, consumer to producer) —
//! plus the composite building blocks assembled from them. The common
//! reentrancy rule across all flow interfaces: `done` may be called
//! synchronously from inside `send`/`recv`, and `send`/`recv` may be called
//! synchronously from inside `done`, but no deeper recursion is allowed —
//! implementations that would otherwise recurse further must break the
//! chain with a [`crate::pending::PendingJob`].

pub mod packet_pass;
pub mod packet_recv;
pub mod stream_pass;
pub mod stream_recv;

pub mod blocker;
pub mod buffer;
pub mod connector;
pub mod copier;
pub mod notifier;

pub use packet_pass::PacketPass;
pub use packet_recv::PacketRecv;
