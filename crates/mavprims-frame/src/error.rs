/// Errors that can occur while building or interpreting frames.
///
/// Inbound decode failures (bad checksum, garbage bytes) never surface here;
/// the decoder recovers from them and only counts them in its statistics.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the protocol's one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Protocol v1 frames carry an 8-bit message id only.
    #[error("message id {id} does not fit in a v1 frame")]
    MessageIdOutOfRange { id: u32 },

    /// No CRC_EXTRA seed is known for the message id.
    #[error("unknown message id {0}")]
    UnknownMessage(u32),

    /// A typed parse was requested for a frame carrying another message.
    #[error("expected message id {expected}, got {actual}")]
    UnexpectedMessage { expected: u32, actual: u32 },

    /// The payload does not parse as the requested dialect message,
    /// typically an enum field holding a value the dialect does not define.
    #[error("payload parse error: {0}")]
    Parse(mavlink::error::ParserError),

    /// A parameter name does not fit in the fixed-width name field.
    #[error("parameter name too long ({len} bytes, max {max})")]
    NameTooLong { len: usize, max: usize },

    /// The signed incompat flag is set but no signature bytes are present.
    #[error("signed frame is missing its signature")]
    MissingSignature,

    /// An I/O error surfaced through a codec adapter.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
