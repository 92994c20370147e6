use std::io;

use mavprims_frame::{FrameConfig, FrameDecoder};

use crate::traits::InboundHandler;

/// Size of the buffer each receive loop reads into.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Decoder plus hand-off, owned by one receive loop.
pub(crate) struct Inbound {
    decoder: FrameDecoder,
    handler: InboundHandler,
}

impl Inbound {
    pub(crate) fn with_config(handler: InboundHandler, config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::with_config(config),
            handler,
        }
    }

    /// Decode a chunk and deliver every completed frame in order.
    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        let handler = &self.handler;
        self.decoder.decode_chunk(chunk, |frame| handler(frame));
    }

    /// Forget a partial frame left over from a dropped stream.
    pub(crate) fn reset(&mut self) {
        self.decoder.reset();
    }
}

/// Errors a polling read returns when nothing arrived in time.
pub(crate) fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
