use std::fmt;
use std::io;

use mavprims_system::{EngineError, LinkError};
use mavprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Serial { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidUrl { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    let code = match err {
        EngineError::ConnectionError => TRANSPORT_ERROR,
        EngineError::Timeout | EngineError::NoSystem => TIMEOUT,
        EngineError::WrongArgument(_) => USAGE,
        EngineError::CommandDenied | EngineError::Busy | EngineError::Unknown(_) => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_exit_codes() {
        assert_eq!(engine_error("x", EngineError::Timeout).code, TIMEOUT);
        assert_eq!(engine_error("x", EngineError::CommandDenied).code, FAILURE);
        assert_eq!(
            engine_error("x", EngineError::ConnectionError).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            engine_error("x", EngineError::WrongArgument("name".into())).code,
            USAGE
        );
    }

    #[test]
    fn invalid_url_is_usage() {
        let err = TransportError::InvalidUrl {
            url: "nope://".into(),
            reason: "unknown scheme",
        };
        assert_eq!(transport_error("open", err).code, USAGE);
    }
}
