//! DataProto wire header (spec §6): the envelope every datagram payload
//! carries, naming its sender and recipients and flagging whether the
//! sender currently wants keep-alives.

use crate::error::CoreError;
use crate::peer::PeerId;

/// Sender currently has at least one peer it is receiving keep-alives from,
/// i.e. it does not need its own keep-alive traffic suppressed.
pub const RECEIVING_KEEPALIVES: u8 = 0x01;

/// Fixed header size: `flags(1) + num_dest(1) + from_id(2)`.
pub const DATAPROTO_HEADER_LEN: usize = 4;

/// Worst-case header overhead for `num_peers` recipients:
/// `DATAPROTO_MAX_OVERHEAD = header + num_peers * size_of(u16)`.
pub fn dataproto_max_overhead(num_peers: usize) -> usize {
    DATAPROTO_HEADER_LEN + num_peers * 2
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataProtoHeader {
    pub receiving_keepalives: bool,
    pub from_id: PeerId,
    pub to_ids: Vec<PeerId>,
}

impl DataProtoHeader {
    pub fn encode(&self) -> Vec<u8> {
        assert!(self.to_ids.len() <= u8::MAX as usize);
        let mut out = Vec::with_capacity(dataproto_max_overhead(self.to_ids.len()));
        let flags = if self.receiving_keepalives {
            RECEIVING_KEEPALIVES
        } else {
            0
        };
        out.push(flags);
        out.push(self.to_ids.len() as u8);
        out.extend_from_slice(&self.from_id.0.to_le_bytes());
        for id in &self.to_ids {
            out.extend_from_slice(&id.0.to_le_bytes());
        }
        out
    }

    /// Decodes the header prefix of `bytes`, returning it along with the
    /// remaining `frame_payload` slice.
    pub fn decode(bytes: &[u8]) -> Result<(DataProtoHeader, &[u8]), CoreError> {
        if bytes.len() < DATAPROTO_HEADER_LEN {
            return Err(CoreError::PolicyViolation);
        }
        let flags = bytes[0];
        let num_dest = bytes[1] as usize;
        let from_id = PeerId(u16::from_le_bytes([bytes[2], bytes[3]]));
        let ids_end = DATAPROTO_HEADER_LEN + num_dest * 2;
        if bytes.len() < ids_end {
            return Err(CoreError::PolicyViolation);
        }
        let mut to_ids = Vec::with_capacity(num_dest);
        for chunk in bytes[DATAPROTO_HEADER_LEN..ids_end].chunks_exact(2) {
            to_ids.push(PeerId(u16::from_le_bytes([chunk[0], chunk[1]])));
        }
        Ok((
            DataProtoHeader {
                receiving_keepalives: flags & RECEIVING_KEEPALIVES != 0,
                from_id,
                to_ids,
            },
            &bytes[ids_end..],
        ))
    }
}

/// Prepends `header` to `frame_payload`, producing a complete DataProto
/// datagram.
pub fn encode_datagram(header: &DataProtoHeader, frame_payload: &[u8]) -> Vec<u8> {
    let mut out = header.encode();
    out.extend_from_slice(frame_payload);
    out
}
