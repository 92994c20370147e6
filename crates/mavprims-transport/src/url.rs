use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::sync::Arc;

use mavprims_frame::FrameConfig;

use crate::error::{Result, TransportError};
use crate::tcp::{TcpConfig, TcpTransport};
use crate::traits::{InboundHandler, Transport};
use crate::udp::{UdpConfig, UdpTransport};

/// Baud rate used when a serial URL does not name one.
pub const DEFAULT_SERIAL_BAUD: u32 = 57_600;

/// A link endpoint in URL form.
///
/// | URL | Link |
/// |---|---|
/// | `udp://[host]:port` | listen, learn the peer (`udp://:14540` binds all interfaces) |
/// | `udpout://host:port` | send to a fixed remote |
/// | `tcp://host:port` | stream client |
/// | `serial:///dev/ttyUSB0[:baud]` | serial device (`serial` feature) |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUrl {
    Udp { local: SocketAddr },
    UdpOut { remote: SocketAddr },
    Tcp { remote: SocketAddr },
    Serial { path: String, baud_rate: u32 },
}

impl ConnectionUrl {
    /// Open the link with the default frame configuration.
    pub fn open(&self, handler: InboundHandler) -> Result<Arc<dyn Transport>> {
        self.open_with(handler, FrameConfig::default())
    }

    pub fn open_with(
        &self,
        handler: InboundHandler,
        frame: FrameConfig,
    ) -> Result<Arc<dyn Transport>> {
        match self {
            Self::Udp { local } => {
                let config = UdpConfig {
                    frame,
                    ..UdpConfig::server(*local)
                };
                Ok(Arc::new(UdpTransport::bind(config, handler)?))
            }
            Self::UdpOut { remote } => {
                let config = UdpConfig {
                    frame,
                    ..UdpConfig::client(*remote)
                };
                Ok(Arc::new(UdpTransport::bind(config, handler)?))
            }
            Self::Tcp { remote } => {
                let config = TcpConfig {
                    frame,
                    ..TcpConfig::new(*remote)
                };
                Ok(Arc::new(TcpTransport::connect(config, handler)?))
            }
            #[cfg(feature = "serial")]
            Self::Serial { path, baud_rate } => {
                let config = crate::serial::SerialConfig {
                    frame,
                    ..crate::serial::SerialConfig::new(path.clone(), *baud_rate)
                };
                Ok(Arc::new(crate::serial::SerialTransport::open(
                    config, handler,
                )?))
            }
            #[cfg(not(feature = "serial"))]
            Self::Serial { .. } => {
                let _ = (handler, frame);
                Err(TransportError::InvalidUrl {
                    url: self.to_string(),
                    reason: "serial support not enabled",
                })
            }
        }
    }
}

impl FromStr for ConnectionUrl {
    type Err = TransportError;

    fn from_str(url: &str) -> Result<Self> {
        let invalid = |reason| TransportError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;

        match scheme {
            "udp" => {
                let (host, port) =
                    split_host_port(rest).ok_or_else(|| invalid("expected [host]:port"))?;
                let host = if host.is_empty() { "0.0.0.0" } else { host };
                let local = resolve(host, port).ok_or_else(|| invalid("cannot resolve host"))?;
                Ok(Self::Udp { local })
            }
            "udpout" | "tcp" => {
                let (host, port) =
                    split_host_port(rest).ok_or_else(|| invalid("expected host:port"))?;
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let remote = resolve(host, port).ok_or_else(|| invalid("cannot resolve host"))?;
                if scheme == "tcp" {
                    Ok(Self::Tcp { remote })
                } else {
                    Ok(Self::UdpOut { remote })
                }
            }
            "serial" => {
                if rest.is_empty() {
                    return Err(invalid("missing device path"));
                }
                let (path, baud_rate) = match rest.rsplit_once(':') {
                    Some((path, baud)) if !path.is_empty() => {
                        let baud_rate = baud.parse().map_err(|_| invalid("invalid baud rate"))?;
                        (path, baud_rate)
                    }
                    _ => (rest, DEFAULT_SERIAL_BAUD),
                };
                Ok(Self::Serial {
                    path: path.to_string(),
                    baud_rate,
                })
            }
            _ => Err(invalid("unknown scheme")),
        }
    }
}

impl fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp { local } => write!(f, "udp://{local}"),
            Self::UdpOut { remote } => write!(f, "udpout://{remote}"),
            Self::Tcp { remote } => write!(f, "tcp://{remote}"),
            Self::Serial { path, baud_rate } => write!(f, "serial://{path}:{baud_rate}"),
        }
    }
}

fn split_host_port(rest: &str) -> Option<(&str, u16)> {
    let (host, port) = rest.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((host, port.parse().ok()?))
}

fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    (host, port).to_socket_addrs().ok()?.next()
}
