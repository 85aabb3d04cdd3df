//! Error taxonomy for the core runtime.
//!
//! Every failure mode the core can produce is one of the kinds below, not a
//! concrete per-module error type. Most kinds are recovered locally or
//! surfaced as a per-peer up/down edge (see the `Propagation` doc on each
//! variant); `Fatal` is the only kind that indicates a broken invariant in
//! the core itself.

use std::fmt;

/// Taxonomy of errors the core can produce.
///
/// Propagation policy (see spec §7):
/// - `OutOfMemory`, `FragmentPool`, `PolicyViolation` are recovered locally
///   and counted; callers are not expected to react to them.
/// - `StreamFraming`, `InactivityTimeout` are surfaced as a per-peer up/down
///   transition rather than returned from the operation that detected them.
/// - `ResourceAcquisition` is fatal to the component being constructed and
///   bubbles through that component's init return.
/// - `Fatal` indicates a broken core invariant. The core never calls
///   `std::process::exit` itself; it returns `Fatal` and leaves the decision
///   to abort to the embedding application.
#[derive(Debug)]
pub enum CoreError {
    /// Allocation failed during construction of some object.
    OutOfMemory,
    /// A socket/handle/timer could not be registered with the reactor.
    ResourceAcquisition(String),
    /// PacketProto decoder saw a record longer than the configured MTU, or a
    /// truncated stream.
    StreamFraming,
    /// A FragmentProto assembler slot was evicted before the frame it held
    /// completed reassembly.
    FragmentPool,
    /// A DataProto packet had an unexpected `from_id`, or its `to_ids` did
    /// not include the local peer.
    PolicyViolation,
    /// The receive-tolerance timer for a peer expired with no traffic.
    InactivityTimeout,
    /// A core invariant was violated. The process should not continue to
    /// rely on the state the core manages.
    Fatal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::OutOfMemory => write!(f, "allocation failed"),
            CoreError::ResourceAcquisition(what) => {
                write!(f, "failed to acquire resource: {}", what)
            }
            CoreError::StreamFraming => write!(f, "stream framing error"),
            CoreError::FragmentPool => write!(f, "fragment reassembly slot evicted"),
            CoreError::PolicyViolation => write!(f, "dataproto policy violation"),
            CoreError::InactivityTimeout => write!(f, "peer receive-tolerance timer expired"),
            CoreError::Fatal(msg) => write!(f, "fatal core invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

pub type Result<T> = std::result::Result<T, CoreError>;
