//! Event-driven packet/flow runtime and VPN client data plane.
//!
//! Built bottom-up: a single-threaded reactor and pending-job queue underlie
//! a small set of flow interfaces, which the packet codecs, queues, and
//! liveness machinery compose into a per-peer DataProto send/receive
//! pipeline. See each module's doc comment for its piece of the whole.

pub mod codec;
pub mod crypto;
pub mod dataproto;
pub mod decider;
pub mod error;
pub mod flow;
pub mod guard;
pub mod liveness;
pub mod peer;
pub mod pending;
pub mod queue;
pub mod reactor;
pub mod router;
pub mod tap;

pub use error::{CoreError, Result};
pub use peer::PeerId;
