use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use mavlink::{MavlinkVersion, MessageData};

use crate::crc::{dialect_crc_extra, frame_checksum};
use crate::error::{FrameError, Result};

/// Start byte of a protocol v1 frame.
pub const STX_V1: u8 = 0xFE;

/// Start byte of a protocol v2 frame.
pub const STX_V2: u8 = 0xFD;

/// v1 header: stx, len, seq, sysid, compid, msgid.
pub const HEADER_LEN_V1: usize = 6;

/// v2 header: stx, len, incompat, compat, seq, sysid, compid, msgid (3 bytes).
pub const HEADER_LEN_V2: usize = 10;

pub const CHECKSUM_LEN: usize = 2;

pub const SIGNATURE_LEN: usize = 13;

/// The length field is a single byte.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Largest possible frame on the wire (signed v2).
pub const MAX_FRAME_LEN: usize = HEADER_LEN_V2 + MAX_PAYLOAD_LEN + CHECKSUM_LEN + SIGNATURE_LEN;

/// Incompat flag: a signature trails the checksum.
pub const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Wire protocol revision of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V1,
    V2,
}

impl From<Version> for MavlinkVersion {
    fn from(version: Version) -> Self {
        match version {
            Version::V1 => MavlinkVersion::V1,
            Version::V2 => MavlinkVersion::V2,
        }
    }
}

/// One decoded (or to-be-encoded) protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: Version,
    pub incompat_flags: u8,
    pub compat_flags: u8,
    pub sequence: u8,
    /// Sender system id.
    pub system_id: u8,
    /// Sender component id.
    pub component_id: u8,
    pub message_id: u32,
    pub payload: Bytes,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl Frame {
    /// Create an unsigned v2 frame with sequence 0.
    pub fn new(
        system_id: u8,
        component_id: u8,
        message_id: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            version: Version::V2,
            incompat_flags: 0,
            compat_flags: 0,
            sequence: 0,
            system_id,
            component_id,
            message_id,
            payload: payload.into(),
            signature: None,
        }
    }

    /// Serialize a dialect payload into a v2 frame.
    ///
    /// The payload is stored already truncated, so the frame compares equal
    /// to what a receiver decodes from the wire.
    pub fn from_message<D: MessageData>(system_id: u8, component_id: u8, msg: &D) -> Self {
        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        let written = msg.ser(MavlinkVersion::V2, &mut buf);
        let keep = truncated_len(&buf[..written]);
        Self::new(
            system_id,
            component_id,
            D::ID,
            Bytes::copy_from_slice(&buf[..keep]),
        )
    }

    /// Interpret the payload as a dialect message.
    ///
    /// Truncated payloads are zero-extended by the dialect parser; values
    /// outside a field's enum fail with [`FrameError::Parse`].
    pub fn parse<D: MessageData>(&self) -> Result<D> {
        if self.message_id != D::ID {
            return Err(FrameError::UnexpectedMessage {
                expected: D::ID,
                actual: self.message_id,
            });
        }
        D::deser(self.version.into(), &self.payload).map_err(FrameError::Parse)
    }

    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn is_signed(&self) -> bool {
        self.incompat_flags & INCOMPAT_FLAG_SIGNED != 0
    }

    /// Bytes this frame occupies on the wire when encoded as-is.
    pub fn wire_size(&self) -> usize {
        match self.version {
            Version::V1 => HEADER_LEN_V1 + self.payload.len() + CHECKSUM_LEN,
            Version::V2 => {
                let signature = if self.is_signed() { SIGNATURE_LEN } else { 0 };
                HEADER_LEN_V2 + truncated_len(&self.payload) + CHECKSUM_LEN + signature
            }
        }
    }
}

/// Length of a v2 payload once trailing zero bytes are stripped.
fn truncated_len(payload: &[u8]) -> usize {
    match payload.iter().rposition(|b| *b != 0) {
        Some(last) => last + 1,
        None => payload.len().min(1),
    }
}

/// Maps message ids to the CRC_EXTRA seed needed to validate them.
///
/// Backed by the common dialect; entries inserted here override it or add
/// messages from other dialects.
#[derive(Debug, Clone)]
pub struct CrcTable {
    extras: HashMap<u32, u8>,
    dialect: bool,
}

impl CrcTable {
    /// A table with no entries; every frame will be treated as unknown.
    pub fn empty() -> Self {
        Self {
            extras: HashMap::new(),
            dialect: false,
        }
    }

    pub fn insert(&mut self, message_id: u32, crc_extra: u8) {
        self.extras.insert(message_id, crc_extra);
    }

    pub fn get(&self, message_id: u32) -> Option<u8> {
        match self.extras.get(&message_id) {
            Some(extra) => Some(*extra),
            None if self.dialect => dialect_crc_extra(message_id),
            None => None,
        }
    }

    pub fn contains(&self, message_id: u32) -> bool {
        self.get(message_id).is_some()
    }
}

impl Default for CrcTable {
    fn default() -> Self {
        Self {
            extras: HashMap::new(),
            dialect: true,
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// CRC_EXTRA lookup for inbound validation.
    pub crc_table: CrcTable,
    /// Accept protocol v1 frames. Default: true.
    pub accept_v1: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            crc_table: CrcTable::default(),
            accept_v1: true,
        }
    }
}

/// Counters kept while decoding a byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_errors: u64,
    pub unknown_messages: u64,
    pub bytes_discarded: u64,
}

/// Encode a frame into the wire format.
///
/// v2 wire format:
/// ```text
/// ┌─────┬─────┬──────────┬────────┬─────┬───────┬────────┬──────────┬─────────┬──────────┬─────────────┐
/// │ STX │ len │ incompat │ compat │ seq │ sysid │ compid │ msgid    │ payload │ checksum │ signature   │
/// │ FD  │ 1B  │ 1B       │ 1B     │ 1B  │ 1B    │ 1B     │ 3B LE    │ len B   │ 2B LE    │ 13B, opt.   │
/// └─────┴─────┴──────────┴────────┴─────┴───────┴────────┴──────────┴─────────┴──────────┴─────────────┘
/// ```
///
/// v2 payloads lose their trailing zero bytes; v1 frames are written verbatim.
pub fn encode_frame(frame: &Frame, crc_extra: u8, dst: &mut BytesMut) -> Result<()> {
    if frame.payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    match frame.version {
        Version::V1 => {
            let message_id = u8::try_from(frame.message_id).map_err(|_| {
                FrameError::MessageIdOutOfRange {
                    id: frame.message_id,
                }
            })?;
            let start = dst.len();
            dst.reserve(frame.wire_size());
            dst.put_u8(STX_V1);
            dst.put_u8(frame.payload.len() as u8);
            dst.put_u8(frame.sequence);
            dst.put_u8(frame.system_id);
            dst.put_u8(frame.component_id);
            dst.put_u8(message_id);
            dst.put_slice(&frame.payload);
            let crc = frame_checksum(&dst[start + 1..], crc_extra);
            dst.put_u16_le(crc);
        }
        Version::V2 => {
            if frame.message_id > 0x00FF_FFFF {
                return Err(FrameError::MessageIdOutOfRange {
                    id: frame.message_id,
                });
            }
            let signature = if frame.is_signed() {
                Some(frame.signature.ok_or(FrameError::MissingSignature)?)
            } else {
                None
            };
            let payload = &frame.payload[..truncated_len(&frame.payload)];
            let start = dst.len();
            dst.reserve(frame.wire_size());
            dst.put_u8(STX_V2);
            dst.put_u8(payload.len() as u8);
            dst.put_u8(frame.incompat_flags);
            dst.put_u8(frame.compat_flags);
            dst.put_u8(frame.sequence);
            dst.put_u8(frame.system_id);
            dst.put_u8(frame.component_id);
            dst.put_slice(&frame.message_id.to_le_bytes()[..3]);
            dst.put_slice(payload);
            let crc = frame_checksum(&dst[start + 1..], crc_extra);
            dst.put_u16_le(crc);
            if let Some(signature) = signature {
                dst.put_slice(&signature);
            }
        }
    }
    Ok(())
}

/// Decode the next valid frame from a buffer.
///
/// Returns `None` when the buffer does not yet hold a complete frame. Garbage
/// before a start byte is dropped; a candidate frame that fails validation
/// loses only its start byte so the scan resumes right after it. Valid frames
/// are consumed from the buffer.
pub fn decode_frame(
    src: &mut BytesMut,
    config: &FrameConfig,
    stats: &mut DecoderStats,
) -> Option<Frame> {
    loop {
        let start = src
            .iter()
            .position(|b| *b == STX_V2 || (*b == STX_V1 && config.accept_v1));
        match start {
            Some(0) => {}
            Some(skip) => {
                src.advance(skip);
                stats.bytes_discarded += skip as u64;
            }
            None => {
                stats.bytes_discarded += src.len() as u64;
                src.clear();
                return None;
            }
        }

        let candidate = if src[0] == STX_V2 {
            check_v2(src, &config.crc_table, stats)
        } else {
            check_v1(src, &config.crc_table, stats)
        };

        match candidate {
            Candidate::Incomplete => return None,
            Candidate::Invalid => {
                src.advance(1);
                stats.bytes_discarded += 1;
            }
            Candidate::Valid(total) => {
                let raw = src.split_to(total).freeze();
                stats.frames += 1;
                return Some(build_frame(raw));
            }
        }
    }
}

enum Candidate {
    Incomplete,
    Invalid,
    /// Total wire length of the validated frame.
    Valid(usize),
}

fn check_v2(src: &BytesMut, table: &CrcTable, stats: &mut DecoderStats) -> Candidate {
    if src.len() < HEADER_LEN_V2 {
        return Candidate::Incomplete;
    }
    let payload_len = src[1] as usize;
    let incompat = src[2];
    if incompat & !INCOMPAT_FLAG_SIGNED != 0 {
        return Candidate::Invalid;
    }
    let signature = if incompat & INCOMPAT_FLAG_SIGNED != 0 {
        SIGNATURE_LEN
    } else {
        0
    };
    let total = HEADER_LEN_V2 + payload_len + CHECKSUM_LEN + signature;
    if src.len() < total {
        return Candidate::Incomplete;
    }
    let message_id = u32::from_le_bytes([src[7], src[8], src[9], 0]);
    verify(src, HEADER_LEN_V2 + payload_len, message_id, table, stats, total)
}

fn check_v1(src: &BytesMut, table: &CrcTable, stats: &mut DecoderStats) -> Candidate {
    if src.len() < HEADER_LEN_V1 {
        return Candidate::Incomplete;
    }
    let payload_len = src[1] as usize;
    let total = HEADER_LEN_V1 + payload_len + CHECKSUM_LEN;
    if src.len() < total {
        return Candidate::Incomplete;
    }
    let message_id = u32::from(src[5]);
    verify(src, HEADER_LEN_V1 + payload_len, message_id, table, stats, total)
}

fn verify(
    src: &BytesMut,
    body_end: usize,
    message_id: u32,
    table: &CrcTable,
    stats: &mut DecoderStats,
    total: usize,
) -> Candidate {
    let Some(crc_extra) = table.get(message_id) else {
        stats.unknown_messages += 1;
        tracing::trace!(message_id, "no CRC_EXTRA for message, resyncing");
        return Candidate::Invalid;
    };
    let expected = frame_checksum(&src[1..body_end], crc_extra);
    let received = u16::from_le_bytes([src[body_end], src[body_end + 1]]);
    if expected != received {
        stats.checksum_errors += 1;
        tracing::debug!(message_id, expected, received, "checksum mismatch, resyncing");
        return Candidate::Invalid;
    }
    Candidate::Valid(total)
}

/// Split a validated raw frame into its fields.
fn build_frame(raw: Bytes) -> Frame {
    let payload_len = raw[1] as usize;
    if raw[0] == STX_V1 {
        return Frame {
            version: Version::V1,
            incompat_flags: 0,
            compat_flags: 0,
            sequence: raw[2],
            system_id: raw[3],
            component_id: raw[4],
            message_id: u32::from(raw[5]),
            payload: raw.slice(HEADER_LEN_V1..HEADER_LEN_V1 + payload_len),
            signature: None,
        };
    }

    let incompat_flags = raw[2];
    let signature = if incompat_flags & INCOMPAT_FLAG_SIGNED != 0 {
        let at = HEADER_LEN_V2 + payload_len + CHECKSUM_LEN;
        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(&raw[at..at + SIGNATURE_LEN]);
        Some(sig)
    } else {
        None
    };
    Frame {
        version: Version::V2,
        incompat_flags,
        compat_flags: raw[3],
        sequence: raw[4],
        system_id: raw[5],
        component_id: raw[6],
        message_id: u32::from_le_bytes([raw[7], raw[8], raw[9], 0]),
        payload: raw.slice(HEADER_LEN_V2..HEADER_LEN_V2 + payload_len),
        signature,
    }
}
