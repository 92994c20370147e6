use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use mavprims_frame::FrameConfig;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::receive::{is_idle, Inbound, READ_BUFFER_SIZE};
use crate::traits::{InboundHandler, Transport};

/// Settings for a stream client link.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub remote: SocketAddr,
    pub connect_timeout: Duration,
    /// Pause between reconnect attempts after the remote closes the stream.
    pub reconnect_interval: Duration,
    pub frame: FrameConfig,
}

impl TcpConfig {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            connect_timeout: Duration::from_secs(2),
            reconnect_interval: Duration::from_secs(1),
            frame: FrameConfig::default(),
        }
    }
}

struct TcpShared {
    config: TcpConfig,
    /// Write half; `None` while disconnected.
    stream: Mutex<Option<TcpStream>>,
    running: AtomicBool,
}

impl TcpShared {
    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.config.remote, self.config.connect_timeout)
            .map_err(|e| TransportError::Connect {
                addr: self.config.remote.to_string(),
                source: e,
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Install a fresh stream and return its read half.
    fn install(&self, stream: TcpStream) -> Result<TcpStream> {
        let reader = stream.try_clone()?;
        if let Ok(mut slot) = self.stream.lock() {
            *slot = Some(stream);
        }
        Ok(reader)
    }

    fn drop_stream(&self) {
        if let Ok(mut slot) = self.stream.lock() {
            if let Some(stream) = slot.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Stream client link with a dedicated receive thread.
///
/// Connects at construction. If the remote closes the stream, the receive
/// thread reconnects at a fixed interval until the link is stopped.
pub struct TcpTransport {
    shared: Arc<TcpShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    pub fn connect(config: TcpConfig, handler: InboundHandler) -> Result<Self> {
        let inbound = Inbound::with_config(handler, config.frame.clone());
        let shared = Arc::new(TcpShared {
            config,
            stream: Mutex::new(None),
            running: AtomicBool::new(true),
        });

        let stream = shared.connect()?;
        let reader = shared.install(stream)?;
        let remote = shared.config.remote;

        let thread = std::thread::Builder::new()
            .name(format!("mav-tcp-{}", remote.port()))
            .spawn({
                let shared = Arc::clone(&shared);
                move || receive_loop(&shared, reader, inbound)
            })?;

        info!(%remote, "tcp link open");

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .stream
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

fn receive_loop(shared: &TcpShared, mut reader: TcpStream, mut inbound: Inbound) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while shared.running() {
        match reader.read(&mut buf) {
            Ok(0) => {}
            Ok(len) => {
                inbound.feed(&buf[..len]);
                continue;
            }
            Err(err) if is_idle(&err) => continue,
            Err(err) => {
                if shared.running() {
                    warn!(error = %err, "tcp receive failed");
                }
            }
        }

        if !shared.running() {
            break;
        }
        warn!(remote = %shared.config.remote, "tcp stream closed by remote");
        shared.drop_stream();
        inbound.reset();

        match reconnect(shared) {
            Some(next) => reader = next,
            None => break,
        }
    }
    debug!("tcp receive loop exited");
}

/// Retry until connected or stopped. `stop` unparks this thread.
fn reconnect(shared: &TcpShared) -> Option<TcpStream> {
    while shared.running() {
        std::thread::park_timeout(shared.config.reconnect_interval);
        if !shared.running() {
            return None;
        }
        match shared.connect().and_then(|stream| shared.install(stream)) {
            Ok(reader) => {
                info!(remote = %shared.config.remote, "tcp link reconnected");
                return Some(reader);
            }
            Err(err) => debug!(error = %err, "tcp reconnect failed"),
        }
    }
    None
}

impl Transport for TcpTransport {
    fn send(&self, bytes: &[u8]) -> bool {
        let Ok(mut slot) = self.shared.stream.lock() else {
            return false;
        };
        let Some(stream) = slot.as_mut() else {
            debug!("tcp link disconnected, dropping send");
            return false;
        };
        match stream.write_all(bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "tcp send failed");
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
        // Shutting down the write half also unblocks the cloned read half.
        self.shared.drop_stream();
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("tcp receive thread panicked");
        }
        info!(remote = %self.shared.config.remote, "tcp link closed");
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.shared.config.remote)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::mpsc;

    use bytes::BytesMut;
    use mavprims_frame::{
        encode_frame, ground_station_heartbeat, Frame, MessageData, HEARTBEAT_DATA,
    };

    use super::*;

    fn collecting_handler() -> (InboundHandler, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let handler: InboundHandler = Arc::new(move |frame| {
            let _ = tx.lock().unwrap().send(frame);
        });
        (handler, rx)
    }

    fn heartbeat() -> (Frame, Vec<u8>) {
        let frame = Frame::from_message(1, 1, &ground_station_heartbeat());
        let mut buf = BytesMut::new();
        encode_frame(&frame, HEARTBEAT_DATA::EXTRA_CRC, &mut buf).unwrap();
        (frame, buf.to_vec())
    }

    #[test]
    fn test_receive_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (handler, rx) = collecting_handler();
        let link =
            TcpTransport::connect(TcpConfig::new(listener.local_addr().unwrap()), handler).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        // Split a frame across two writes.
        let (frame, bytes) = heartbeat();
        peer.write_all(&bytes[..7]).unwrap();
        peer.flush().unwrap();
        peer.write_all(&bytes[7..]).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), frame);

        assert!(link.send(b"ping"));
        let mut buf = [0u8; 4];
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        link.stop();
        assert!(!link.send(b"after stop"));
        let mut rest = Vec::new();
        assert_eq!(peer.read_to_end(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_reconnects_after_remote_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (handler, rx) = collecting_handler();
        let mut config = TcpConfig::new(listener.local_addr().unwrap());
        config.reconnect_interval = Duration::from_millis(20);
        let link = TcpTransport::connect(config, handler).unwrap();

        let (first, _) = listener.accept().unwrap();
        drop(first);

        let (mut second, _) = listener.accept().unwrap();
        let (frame, bytes) = heartbeat();
        second.write_all(&bytes).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), frame);
        assert!(link.is_connected());

        link.stop();
        link.stop();
    }

    #[test]
    fn test_connect_refused() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let (handler, _rx) = collecting_handler();
        let result = TcpTransport::connect(TcpConfig::new(addr), handler);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
