//! DataProto send-side pipeline: per-peer destinations, per-route local
//! sources, and per-source relay fan-out (spec §4.I–§4.K).

pub mod dest;
pub mod local_source;
pub mod relay_source;

pub use dest::DataProtoDest;
pub use local_source::LocalSource;
pub use relay_source::RelaySource;
