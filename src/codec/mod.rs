//! Packet codecs (spec §4.E): stream framing and fragmentation, plus the
//! DataProto wire header they carry.

pub mod dataproto;
pub mod fragmentproto;
pub mod packetproto;
