use bytes::BytesMut;

use crate::codec::{decode_frame, DecoderStats, Frame, FrameConfig, MAX_FRAME_LEN};

const INITIAL_BUFFER_CAPACITY: usize = 2 * MAX_FRAME_LEN;

/// Incremental frame parser for one byte stream.
///
/// Accepts chunks of any size, split anywhere, and hands back complete,
/// checksum-validated frames. One decoder per channel; it is not shared.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    config: FrameConfig,
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a decoder with the default CRC table.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            stats: DecoderStats::default(),
        }
    }

    /// Feed one byte; returns a frame if this byte completed one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.buf.extend_from_slice(&[byte]);
        self.next_frame()
    }

    /// Append bytes without decoding.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame already buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        decode_frame(&mut self.buf, &self.config, &mut self.stats)
    }

    /// Feed a chunk and hand every completed frame to `on_frame`, in order.
    pub fn decode_chunk(&mut self, chunk: &[u8], mut on_frame: impl FnMut(Frame)) {
        self.extend(chunk);
        while let Some(frame) = self.next_frame() {
            on_frame(frame);
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame, e.g. after a stream reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, CrcTable};
    use crate::messages::{
        ground_station_heartbeat, status_text, ParamId, COMMAND_ACK_DATA, COMMAND_LONG_DATA,
        PARAM_SET_DATA, PARAM_VALUE_DATA,
    };
    use mavlink::common::{MavCmd, MavParamType, MavResult, MavSeverity};

    fn sample_frames() -> Vec<Frame> {
        let name = ParamId::from_name("MIS_TAKEOFF_ALT").unwrap().into_bytes();
        vec![
            Frame::from_message(1, 1, &ground_station_heartbeat()).with_sequence(0),
            Frame::from_message(
                1,
                1,
                &COMMAND_LONG_DATA {
                    target_system: 1,
                    target_component: 1,
                    command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                    param1: 1.0,
                    ..COMMAND_LONG_DATA::default()
                },
            )
            .with_sequence(1),
            Frame::from_message(
                1,
                1,
                &COMMAND_ACK_DATA {
                    command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                    result: MavResult::MAV_RESULT_IN_PROGRESS,
                    progress: 40,
                    ..COMMAND_ACK_DATA::default()
                },
            )
            .with_sequence(2),
            Frame::from_message(
                1,
                1,
                &PARAM_VALUE_DATA {
                    param_value: 2.5,
                    param_count: 1000,
                    param_index: 17,
                    param_id: name,
                    param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
                },
            )
            .with_sequence(3),
            Frame::from_message(
                245,
                190,
                &PARAM_SET_DATA {
                    param_value: 5.0,
                    target_system: 1,
                    target_component: 1,
                    param_id: name,
                    param_type: MavParamType::MAV_PARAM_TYPE_REAL32,
                },
            )
            .with_sequence(4),
            Frame::from_message(
                1,
                1,
                &status_text(MavSeverity::MAV_SEVERITY_CRITICAL, "Preflight Fail: GPS"),
            )
            .with_sequence(255),
        ]
    }

    fn encode_all(frames: &[Frame]) -> Vec<u8> {
        let table = CrcTable::default();
        let mut buf = BytesMut::new();
        for frame in frames {
            let extra = table.get(frame.message_id).unwrap();
            encode_frame(frame, extra, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn test_byte_at_a_time() {
        let frames = sample_frames();
        let stream = encode_all(&frames);

        let mut decoder = FrameDecoder::new();
        let decoded: Vec<Frame> = stream.iter().filter_map(|b| decoder.push(*b)).collect();

        assert_eq!(decoded, frames);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().frames, frames.len() as u64);
    }

    #[test]
    fn test_arbitrary_split_points() {
        let frames = sample_frames();
        let stream = encode_all(&frames);

        // Every chunk size from 1 byte to the whole stream, plus a prime stride
        // that puts cuts mid-header and mid-checksum.
        for chunk_size in (1..=stream.len()).step_by(7).chain([13, stream.len()]) {
            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoder.decode_chunk(chunk, |frame| decoded.push(frame));
            }
            assert_eq!(decoded, frames, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_uneven_splits() {
        let frames = sample_frames();
        let stream = encode_all(&frames);

        let cuts = [1usize, 2, 9, 10, 11, 40, 41, 42, 90, 91, 150];
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        let mut last = 0;
        for cut in cuts.iter().copied().filter(|c| *c < stream.len()) {
            decoder.decode_chunk(&stream[last..cut], |frame| decoded.push(frame));
            last = cut;
        }
        decoder.decode_chunk(&stream[last..], |frame| decoded.push(frame));

        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_noise_between_frames() {
        let frames = sample_frames();
        let table = CrcTable::default();
        let mut stream = BytesMut::new();
        for frame in &frames {
            stream.extend_from_slice(&[0x00, 0x42, 0x13]);
            encode_frame(frame, table.get(frame.message_id).unwrap(), &mut stream).unwrap();
        }

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        decoder.decode_chunk(&stream, |frame| decoded.push(frame));

        assert_eq!(decoded, frames);
        assert_eq!(decoder.stats().bytes_discarded, 3 * frames.len() as u64);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let frames = sample_frames();
        let stream = encode_all(&frames[..1]);

        let mut decoder = FrameDecoder::new();
        decoder.extend(&stream[..5]);
        assert_eq!(decoder.buffered(), 5);
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);

        let mut decoded = Vec::new();
        decoder.decode_chunk(&stream, |frame| decoded.push(frame));
        assert_eq!(decoded, frames[..1].to_vec());
    }
}
