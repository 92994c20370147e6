use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use mavprims_frame::FrameConfig;
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::receive::{is_idle, Inbound};
use crate::traits::{InboundHandler, Transport};

const SERIAL_READ_CHUNK: usize = 1024;

/// Settings for a serial link.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// Polling interval of the receive loop.
    pub read_timeout: Duration,
    pub frame: FrameConfig,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}

/// Serial device link with a polling receive thread.
pub struct SerialTransport {
    path: String,
    port: Mutex<Box<dyn SerialPort>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn open(config: SerialConfig, handler: InboundHandler) -> Result<Self> {
        let serial_error = |e: serialport::Error| TransportError::Serial {
            path: config.path.clone(),
            source: e.into(),
        };
        let port = serialport::new(&config.path, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(serial_error)?;
        let reader = port.try_clone().map_err(serial_error)?;

        let running = Arc::new(AtomicBool::new(true));
        let thread = std::thread::Builder::new()
            .name("mav-serial".to_string())
            .spawn({
                let running = Arc::clone(&running);
                let inbound = Inbound::with_config(handler, config.frame.clone());
                move || receive_loop(reader, &running, inbound)
            })?;

        info!(path = %config.path, baud = config.baud_rate, "serial link open");

        Ok(Self {
            path: config.path,
            port: Mutex::new(port),
            running,
            thread: Mutex::new(Some(thread)),
        })
    }
}

fn receive_loop(mut reader: Box<dyn SerialPort>, running: &AtomicBool, mut inbound: Inbound) {
    let mut buf = [0u8; SERIAL_READ_CHUNK];
    while running.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => {}
            Ok(len) => inbound.feed(&buf[..len]),
            Err(err) if is_idle(&err) => {}
            Err(err) => {
                warn!(error = %err, "serial receive failed, closing link");
                break;
            }
        }
    }
    debug!("serial receive loop exited");
}

impl Transport for SerialTransport {
    fn send(&self, bytes: &[u8]) -> bool {
        let Ok(mut port) = self.port.lock() else {
            return false;
        };
        match port.write_all(bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.path, error = %err, "serial send failed");
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
        // The read timeout bounds how long the loop takes to notice.
        self.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            warn!("serial receive thread panicked");
        }
        info!(path = %self.path, "serial link closed");
    }

    fn describe(&self) -> String {
        format!("serial {}", self.path)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
