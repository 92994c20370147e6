use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, DecoderStats, Frame, FrameConfig};
use crate::error::FrameError;

/// `tokio_util` codec adapter over the frame encoder/decoder.
///
/// Outbound frames need a CRC_EXTRA entry in the configured table.
#[derive(Debug, Default)]
pub struct MavCodec {
    config: FrameConfig,
    stats: DecoderStats,
}

impl MavCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

impl Decoder for MavCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(decode_frame(src, &self.config, &mut self.stats))
    }
}

impl Encoder<Frame> for MavCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let crc_extra = self
            .config
            .crc_table
            .get(item.message_id)
            .ok_or(FrameError::UnknownMessage(item.message_id))?;
        encode_frame(&item, crc_extra, dst)
    }
}
