use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use mavprims_frame::FrameConfig;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::receive::{is_idle, Inbound, READ_BUFFER_SIZE};
use crate::traits::{InboundHandler, Transport};

/// Settings for a datagram link.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address to bind. Port 0 picks an ephemeral port.
    pub local: SocketAddr,
    /// Fixed destination. When unset, the first sender is adopted as the peer.
    pub remote: Option<SocketAddr>,
    /// Upper bound on how long shutdown waits for a blocked receive.
    pub read_timeout: Duration,
    pub frame: FrameConfig,
}

impl UdpConfig {
    /// Listen on `local` and learn the peer from the first inbound packet.
    pub fn server(local: SocketAddr) -> Self {
        Self {
            local,
            remote: None,
            read_timeout: Duration::from_millis(250),
            frame: FrameConfig::default(),
        }
    }

    /// Send to a fixed `remote` from an ephemeral local port.
    pub fn client(remote: SocketAddr) -> Self {
        let local = match remote {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        Self {
            remote: Some(remote),
            ..Self::server(local)
        }
    }
}

struct UdpShared {
    peer: Mutex<Option<SocketAddr>>,
    fixed_remote: bool,
    running: AtomicBool,
}

/// Datagram link with a dedicated receive thread.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    shared: Arc<UdpShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind the socket and start the receive loop.
    pub fn bind(config: UdpConfig, handler: InboundHandler) -> Result<Self> {
        let socket = UdpSocket::bind(config.local).map_err(|e| TransportError::Bind {
            addr: config.local.to_string(),
            source: e,
        })?;
        socket.set_read_timeout(Some(config.read_timeout))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let shared = Arc::new(UdpShared {
            peer: Mutex::new(config.remote),
            fixed_remote: config.remote.is_some(),
            running: AtomicBool::new(true),
        });

        let thread = std::thread::Builder::new()
            .name(format!("mav-udp-{}", local_addr.port()))
            .spawn({
                let socket = Arc::clone(&socket);
                let shared = Arc::clone(&shared);
                let inbound = Inbound::with_config(handler, config.frame);
                move || receive_loop(&socket, &shared, inbound)
            })?;

        info!(%local_addr, remote = ?config.remote, "udp link open");

        Ok(Self {
            socket,
            local_addr,
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current send destination, fixed or learned.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.shared.peer.lock().ok().and_then(|peer| *peer)
    }

    /// Address a wake-up datagram can reach this socket on.
    fn wake_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }
}

fn receive_loop(socket: &UdpSocket, shared: &UdpShared, mut inbound: Inbound) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while shared.running.load(Ordering::Acquire) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if is_idle(&err) => continue,
            Err(err) => {
                if shared.running.load(Ordering::Acquire) {
                    warn!(error = %err, "udp receive failed");
                    continue;
                }
                break;
            }
        };
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if len == 0 {
            continue;
        }

        if !shared.fixed_remote {
            let Ok(mut peer) = shared.peer.lock() else {
                break;
            };
            match *peer {
                None => {
                    info!(peer = %from, "udp peer learned");
                    *peer = Some(from);
                }
                Some(known) if known != from => {
                    debug!(peer = %from, "dropping datagram from unknown sender");
                    continue;
                }
                Some(_) => {}
            }
        }

        inbound.feed(&buf[..len]);
    }
    debug!("udp receive loop exited");
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> bool {
        let Some(peer) = self.peer() else {
            debug!(local = %self.local_addr, "no udp peer yet, dropping send");
            return false;
        };
        match self.socket.send_to(bytes, peer) {
            Ok(sent) => sent == bytes.len(),
            Err(err) => {
                warn!(%peer, error = %err, "udp send failed");
                false
            }
        }
    }

    fn stop(&self) {
        let handle = match self.thread.lock() {
            Ok(mut thread) => thread.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return;
        };

        self.shared.running.store(false, Ordering::Release);
        // An empty datagram unblocks recv_from; the read timeout covers the
        // case where it cannot be delivered.
        if let Err(err) = self.socket.send_to(&[], self.wake_addr()) {
            debug!(error = %err, "udp wake datagram failed");
        }
        if handle.join().is_err() {
            warn!("udp receive thread panicked");
        }
        info!(local = %self.local_addr, "udp link closed");
    }

    fn describe(&self) -> String {
        match self.peer() {
            Some(peer) => format!("udp {} <-> {}", self.local_addr, peer),
            None => format!("udp {} (no peer)", self.local_addr),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
