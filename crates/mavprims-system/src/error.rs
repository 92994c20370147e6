use mavprims_frame::FrameError;
use mavprims_transport::TransportError;

/// Terminal failure of a command or parameter request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The request could not be handed to any link.
    #[error("connection error: send failed")]
    ConnectionError,

    /// No acknowledgement or reply arrived after all retries.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The request queue is full.
    #[error("engine busy")]
    Busy,

    /// The remote refused the command.
    #[error("command denied")]
    CommandDenied,

    /// The request targets a system with no known route.
    #[error("no system")]
    NoSystem,

    /// Malformed local input.
    #[error("wrong argument: {0}")]
    WrongArgument(String),

    /// A result code this engine does not classify.
    #[error("unknown result code {0}")]
    Unknown(u8),
}

pub type CommandResult = Result<(), EngineError>;

pub type ParamResult<T> = Result<T, EngineError>;

/// Errors from setting up links on a registry.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
