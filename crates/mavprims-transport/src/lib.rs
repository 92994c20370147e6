//! Links between the protocol engine and remote participants.
//!
//! Every link owns one receive thread that reads from its channel, feeds an
//! incremental frame decoder and hands each complete frame to an
//! [`InboundHandler`]. Sending is a single call taking one encoded frame.
//!
//! - UDP, listening (peer learned from the first sender) or with a fixed remote
//! - TCP client with reconnect
//! - Serial devices (`serial` feature)

pub mod error;
mod receive;
pub mod tcp;
pub mod traits;
pub mod udp;
pub mod url;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use tcp::{TcpConfig, TcpTransport};
pub use traits::{InboundHandler, Transport};
pub use udp::{UdpConfig, UdpTransport};
pub use url::{ConnectionUrl, DEFAULT_SERIAL_BAUD};

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};
