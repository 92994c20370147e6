use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::BytesMut;
use mavprims_frame::{encode_frame, ids, Frame, FrameError, MessageData};
use mavprims_transport::{ConnectionUrl, InboundHandler, Transport};
use tracing::{debug, error, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::error::LinkError;
use crate::events::{EventHub, SystemEvent};
use crate::sender::{FrameSender, Outbound};
use crate::sync::lock;
use crate::system::{System, SystemCore};
use crate::token::{Token, TokenAllocator};

struct LinkInner {
    this: Weak<LinkInner>,
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    transports: Mutex<Vec<Arc<dyn Transport>>>,
    /// In creation order; at most one per (system id, component id).
    systems: Mutex<Vec<Arc<System>>>,
    sequence: AtomicU8,
    events: Arc<EventHub>,
    tokens: TokenAllocator,
}

/// Owns every link and every system seen on them.
///
/// Outbound frames fan out to all links. Inbound frames are routed to the
/// system matching their sender ids, which is created on first contact.
pub struct LinkRegistry {
    inner: Arc<LinkInner>,
}

impl LinkRegistry {
    pub fn new(config: CoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoreConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Arc::new_cyclic(|this| LinkInner {
            this: this.clone(),
            config,
            clock,
            transports: Mutex::new(Vec::new()),
            systems: Mutex::new(Vec::new()),
            sequence: AtomicU8::new(0),
            events: Arc::new(EventHub::new()),
            tokens: TokenAllocator::new(),
        });
        Self { inner }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Open a link from a connection URL and add it.
    pub fn add_connection(&self, url: &str) -> Result<(), LinkError> {
        let url: ConnectionUrl = url.parse()?;
        let transport = url.open_with(self.handler(), self.inner.config.frame.clone())?;
        info!(link = %transport.describe(), "link added");
        self.add_transport(transport);
        Ok(())
    }

    /// Add an already-open link. Its inbound frames must go to [`Self::handler`].
    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        lock(&self.inner.transports).push(transport);
    }

    pub fn transport_count(&self) -> usize {
        lock(&self.inner.transports).len()
    }

    /// Inbound callback to hand to a transport.
    pub fn handler(&self) -> InboundHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |frame: Frame| {
            if let Some(inner) = weak.upgrade() {
                inner.route_inbound(&frame);
            }
        })
    }

    /// Route one inbound frame; see [`Self::handler`].
    pub fn route_inbound(&self, frame: &Frame) {
        self.inner.route_inbound(frame);
    }

    /// Send `frame` on every link. True only if every link accepted it.
    pub fn broadcast(&self, frame: Frame) -> bool {
        self.inner.broadcast(frame)
    }

    /// Send a message stamped with our own ids on every link.
    pub fn send_message<M: MessageData>(&self, msg: &M) -> bool {
        let config = &self.inner.config;
        self.inner.broadcast(Frame::from_message(
            config.own_system_id,
            config.own_component_id,
            msg,
        ))
    }

    /// The first real system, or a placeholder while none is known.
    ///
    /// The placeholder answers `NoSystem` and is dropped as soon as a real
    /// system is routed.
    pub fn system(&self) -> Option<Arc<System>> {
        let mut systems = lock(&self.inner.systems);
        if let Some(system) = systems.iter().find(|s| !s.is_placeholder()) {
            return Some(Arc::clone(system));
        }
        if let Some(placeholder) = systems.first() {
            return Some(Arc::clone(placeholder));
        }
        let placeholder = self.inner.create_system(0, 0)?;
        systems.push(Arc::clone(&placeholder));
        Some(placeholder)
    }

    pub fn system_by_id(&self, system_id: u8, component_id: u8) -> Option<Arc<System>> {
        lock(&self.inner.systems)
            .iter()
            .find(|s| s.system_id() == system_id && s.component_id() == component_id)
            .cloned()
    }

    /// The system with resolved identity `uuid`.
    pub fn system_by_uuid(&self, uuid: u64) -> Option<Arc<System>> {
        lock(&self.inner.systems)
            .iter()
            .find(|s| s.is_discovered() && s.uuid() == uuid)
            .cloned()
    }

    /// Every real system, in the order first seen.
    pub fn systems(&self) -> Vec<Arc<System>> {
        lock(&self.inner.systems)
            .iter()
            .filter(|s| !s.is_placeholder())
            .cloned()
            .collect()
    }

    /// Receive discovery and connection events from every system.
    pub fn subscribe(&self, callback: impl Fn(&SystemEvent) + Send + Sync + 'static) -> Token {
        let token = self.inner.tokens.allocate();
        self.inner.events.subscribe(token, callback);
        token
    }

    pub fn unsubscribe(&self, token: Token) {
        self.inner.events.unsubscribe(token);
    }

    /// Stop every link, then every system. Safe to call twice.
    pub fn shutdown(&self) {
        let transports = std::mem::take(&mut *lock(&self.inner.transports));
        for transport in &transports {
            transport.stop();
        }
        let systems = std::mem::take(&mut *lock(&self.inner.systems));
        for system in &systems {
            system.shutdown();
        }
        if !transports.is_empty() || !systems.is_empty() {
            debug!(
                links = transports.len(),
                systems = systems.len(),
                "link registry shut down"
            );
        }
    }
}

impl Drop for LinkRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LinkInner {
    fn create_system(&self, system_id: u8, component_id: u8) -> Option<Arc<System>> {
        let sender: Arc<dyn FrameSender> = Arc::new(RegistrySender(self.this.clone()));
        let outbound = Outbound::new(
            sender,
            self.config.own_system_id,
            self.config.own_component_id,
        );
        let core = SystemCore::new(
            system_id,
            component_id,
            self.config.system.clone(),
            Arc::clone(&self.clock),
            outbound,
            Arc::clone(&self.events),
        );
        match System::spawn(core) {
            Ok(system) => Some(Arc::new(system)),
            Err(err) => {
                error!(system_id, error = %err, "failed to start system worker");
                None
            }
        }
    }

    fn route_inbound(&self, frame: &Frame) {
        if frame.system_id == 0 {
            trace!(
                message = ids::message_name(frame.message_id),
                "dropping frame from system id 0"
            );
            return;
        }

        let (system, siblings) = {
            let mut systems = lock(&self.systems);
            // A command aimed at another component (a camera, a gimbal) is
            // queued on a sibling system of the same id, so acks go to all.
            let siblings: Vec<Arc<System>> = if frame.message_id == ids::MSG_COMMAND_ACK {
                systems
                    .iter()
                    .filter(|s| {
                        s.system_id() == frame.system_id
                            && s.component_id() != frame.component_id
                    })
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            let existing = systems.iter().position(|s| {
                s.system_id() == frame.system_id && s.component_id() == frame.component_id
            });
            let system = match existing {
                Some(index) => Arc::clone(&systems[index]),
                None => {
                    let Some(system) = self.create_system(frame.system_id, frame.component_id)
                    else {
                        return;
                    };
                    info!(
                        system_id = frame.system_id,
                        component = ids::component_name(frame.component_id),
                        "new system"
                    );
                    systems.push(Arc::clone(&system));
                    system
                }
            };
            (system, siblings)
        };

        system.handle_frame(frame);
        for sibling in &siblings {
            sibling.commands().on_command_ack(frame);
        }
        self.collect_placeholder();
    }

    fn collect_placeholder(&self) {
        let removed: Vec<Arc<System>> = {
            let mut systems = lock(&self.systems);
            if !systems.iter().any(|s| s.is_placeholder()) {
                return;
            }
            let (placeholders, real): (Vec<_>, Vec<_>) =
                systems.drain(..).partition(|s| s.is_placeholder());
            *systems = real;
            placeholders
        };
        for placeholder in &removed {
            debug!("dropping placeholder system");
            placeholder.shutdown();
        }
    }

    fn broadcast(&self, frame: Frame) -> bool {
        let Some(crc_extra) = self.config.frame.crc_table.get(frame.message_id) else {
            warn!(
                message_id = frame.message_id,
                error = %FrameError::UnknownMessage(frame.message_id),
                "cannot encode frame"
            );
            return false;
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = frame.with_sequence(sequence);

        let mut buf = BytesMut::with_capacity(frame.wire_size());
        if let Err(err) = encode_frame(&frame, crc_extra, &mut buf) {
            warn!(message_id = frame.message_id, error = %err, "cannot encode frame");
            return false;
        }

        let transports: Vec<Arc<dyn Transport>> = lock(&self.transports).clone();
        if transports.is_empty() {
            trace!(message_id = frame.message_id, "no links to send on");
            return false;
        }
        let mut all_sent = true;
        for transport in &transports {
            if !transport.send(&buf) {
                debug!(link = %transport.describe(), "send failed");
                all_sent = false;
            }
        }
        all_sent
    }
}

/// Outbound path handed to every system; holds the registry weakly.
struct RegistrySender(Weak<LinkInner>);

impl FrameSender for RegistrySender {
    fn send_frame(&self, frame: Frame) -> bool {
        match self.0.upgrade() {
            Some(inner) => inner.broadcast(frame),
            None => false,
        }
    }
}
