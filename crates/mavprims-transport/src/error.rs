/// Errors that can occur while opening or running a link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified local address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified remote address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to open or configure a serial device.
    #[error("failed to open serial device {path}: {source}")]
    Serial {
        path: String,
        source: std::io::Error,
    },

    /// A connection URL could not be parsed.
    #[error("invalid connection url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
