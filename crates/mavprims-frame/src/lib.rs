//! MAVLink framing for the mavprims protocol engine.
//!
//! This is the wire layer. It provides:
//! - The X.25 checksum, seeded from the common dialect's CRC_EXTRA table
//! - v1 and v2 frame encode/decode, including v2 payload truncation and signatures
//! - An incremental decoder that survives fragmented, concatenated and corrupted streams
//! - Helpers around the dialect payloads the engines exchange
//!
//! Payload layouts come from the `mavlink` crate (common dialect). Outbound
//! frames are always v2.

pub mod codec;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod ids;
pub mod messages;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_frame, encode_frame, CrcTable, DecoderStats, Frame, FrameConfig, Version,
    MAX_FRAME_LEN, MAX_PAYLOAD_LEN,
};
pub use decoder::FrameDecoder;
pub use error::{FrameError, Result};
pub use messages::{
    ground_station_heartbeat, is_armed, status_text, status_text_string, MessageData, ParamId,
    AUTOPILOT_VERSION_DATA, COMMAND_ACK_DATA, COMMAND_LONG_DATA, EXTENDED_SYS_STATE_DATA,
    HEARTBEAT_DATA, PARAM_REQUEST_LIST_DATA, PARAM_REQUEST_READ_DATA, PARAM_SET_DATA,
    PARAM_VALUE_DATA, STATUSTEXT_DATA,
};

/// The dialect crate, for enum types such as `common::MavCmd`.
pub use mavlink;

#[cfg(feature = "async")]
pub use async_codec::MavCodec;
