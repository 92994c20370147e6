//! Frame checksum: X.25 (CRC-16/MCRF4XX) seeded with the message's CRC_EXTRA.
//!
//! CRC_EXTRA seeds come from the common dialect generated by the `mavlink`
//! crate; the accumulator is the same `crc-any` one that crate uses.

use crc_any::CRCu16;
use mavlink::common::MavMessage;
use mavlink::Message;

/// Checksum over `body` (header without start byte, then payload) and `crc_extra`.
pub fn frame_checksum(body: &[u8], crc_extra: u8) -> u16 {
    let mut crc = CRCu16::crc16mcrf4cc();
    crc.digest(body);
    crc.digest(&[crc_extra]);
    crc.get_crc()
}

/// CRC_EXTRA of a common-dialect message, `None` if the dialect lacks the id.
pub fn dialect_crc_extra(message_id: u32) -> Option<u8> {
    MavMessage::default_message_from_id(message_id)
        .ok()
        .map(|_| MavMessage::extra_crc(message_id))
}
