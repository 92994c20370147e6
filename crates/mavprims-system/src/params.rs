use std::collections::VecDeque;
use std::fmt;
use std::sync::{mpsc, Arc, Mutex, Weak};

use mavlink::common::MavParamType;
use mavprims_frame::{
    ids, Frame, FrameError, ParamId, PARAM_REQUEST_READ_DATA, PARAM_SET_DATA, PARAM_VALUE_DATA,
};
use tracing::{debug, warn};

use crate::config::ParamConfig;
use crate::error::{EngineError, ParamResult};
use crate::sender::Outbound;
use crate::sync::lock;
use crate::timeout::TimeoutScheduler;
use crate::token::Token;

/// A parameter value as the autopilot stores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int32(i32),
}

impl ParamValue {
    /// Wire representation: the 4-byte value field and its type tag.
    ///
    /// Integers are carried byte-for-byte inside the float field.
    pub fn to_wire(self) -> (f32, MavParamType) {
        match self {
            Self::Float(value) => (value, MavParamType::MAV_PARAM_TYPE_REAL32),
            Self::Int32(value) => (
                f32::from_le_bytes(value.to_le_bytes()),
                MavParamType::MAV_PARAM_TYPE_INT32,
            ),
        }
    }

    /// Read a value back; narrower integer types widen to `Int32`.
    pub fn from_wire(value: f32, param_type: u8) -> Option<Self> {
        let raw = value.to_le_bytes();
        let parsed = match param_type {
            ids::PARAM_TYPE_REAL32 => Self::Float(value),
            ids::PARAM_TYPE_INT32 | ids::PARAM_TYPE_UINT32 => Self::Int32(i32::from_le_bytes(raw)),
            ids::PARAM_TYPE_INT16 => Self::Int32(i32::from(i16::from_le_bytes([raw[0], raw[1]]))),
            ids::PARAM_TYPE_UINT16 => Self::Int32(i32::from(u16::from_le_bytes([raw[0], raw[1]]))),
            ids::PARAM_TYPE_INT8 => Self::Int32(i32::from(raw[0] as i8)),
            ids::PARAM_TYPE_UINT8 => Self::Int32(i32::from(raw[0])),
            _ => return None,
        };
        Some(parsed)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(value) => write!(f, "{value}"),
            Self::Int32(value) => write!(f, "{value}"),
        }
    }
}

pub type SetCallback = Box<dyn FnOnce(ParamResult<()>) + Send>;
pub type GetCallback = Box<dyn FnOnce(ParamResult<ParamValue>) + Send>;

enum Request {
    Set { value: ParamValue, callback: SetCallback },
    Get { callback: GetCallback },
}

impl Request {
    fn fail(self, error: EngineError) {
        match self {
            Self::Set { callback, .. } => callback(Err(error)),
            Self::Get { callback } => callback(Err(error)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Get { .. } => "get",
        }
    }
}

struct Work {
    id: u64,
    name: ParamId,
    retries_remaining: u32,
    request: Request,
}

#[derive(Default)]
struct EngineState {
    set_queue: VecDeque<Work>,
    get_queue: VecDeque<Work>,
    /// The request on the wire, if any.
    active: Option<Work>,
    next_id: u64,
    /// Set by `fail_all`; later requests fail at once.
    closed: bool,
}

struct Inner {
    target_system_id: u8,
    target_component_id: u8,
    config: ParamConfig,
    outbound: Outbound,
    timeouts: Arc<TimeoutScheduler>,
    token: Token,
    state: Mutex<EngineState>,
}

/// Gets and sets parameters by name, one request on the wire at a time.
///
/// Queued sets always go out before queued gets; each class is FIFO.
/// Replies are matched by parameter name.
pub struct ParamEngine {
    inner: Arc<Inner>,
}

impl ParamEngine {
    pub fn new(
        target_system_id: u8,
        target_component_id: u8,
        config: ParamConfig,
        outbound: Outbound,
        timeouts: Arc<TimeoutScheduler>,
        token: Token,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                target_system_id,
                target_component_id,
                config,
                outbound,
                timeouts,
                token,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn set_param_async(
        &self,
        name: &str,
        value: ParamValue,
        callback: impl FnOnce(ParamResult<()>) + Send + 'static,
    ) {
        let request = Request::Set {
            value,
            callback: Box::new(callback),
        };
        self.inner.enqueue(name, request);
    }

    pub fn get_param_async(
        &self,
        name: &str,
        callback: impl FnOnce(ParamResult<ParamValue>) + Send + 'static,
    ) {
        let request = Request::Get {
            callback: Box::new(callback),
        };
        self.inner.enqueue(name, request);
    }

    /// Set a parameter and block until it is confirmed.
    ///
    /// Must not be called from a message handler or the worker thread.
    pub fn set_param(&self, name: &str, value: ParamValue) -> ParamResult<()> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.set_param_async(name, value, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Err(EngineError::ConnectionError))
    }

    /// Read a parameter and block until it arrives.
    pub fn get_param(&self, name: &str) -> ParamResult<ParamValue> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.get_param_async(name, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Err(EngineError::ConnectionError))
    }

    /// Put the next request on the wire if none is active.
    pub fn do_work(&self) {
        let inner = &self.inner;
        let mut state = lock(&inner.state);
        if state.active.is_some() {
            return;
        }
        let next = match state.set_queue.pop_front() {
            Some(work) => work,
            None => match state.get_queue.pop_front() {
                Some(work) => work,
                None => return,
            },
        };
        let (id, outgoing) = (next.id, inner.message_for(&next));
        debug!(param = %next.name.name(), kind = next.request.kind(), "sending parameter request");
        state.active = Some(next);
        Inner::arm(inner, id);
        drop(state);

        inner.transmit(id, &outgoing);
    }

    /// Handle a PARAM_VALUE from the target system.
    pub fn on_param_value(&self, frame: &Frame) {
        let Some(reply) = Reply::from_frame(frame) else {
            return;
        };
        self.inner.handle_value(&reply);
    }

    /// Fail the active request and everything queued with `error`, and
    /// refuse new requests.
    ///
    /// Callbacks run after the engine lock is released.
    pub fn fail_all(&self, error: EngineError) {
        let inner = &self.inner;
        let drained: Vec<Work> = {
            let mut state = lock(&inner.state);
            state.closed = true;
            let mut drained: Vec<Work> = state.active.take().into_iter().collect();
            drained.extend(state.set_queue.drain(..));
            drained.extend(state.get_queue.drain(..));
            drained
        };
        inner.timeouts.cancel(inner.token);
        if !drained.is_empty() {
            debug!(
                system_id = inner.target_system_id,
                pending = drained.len(),
                %error,
                "failing pending parameter requests"
            );
        }
        for work in drained {
            work.request.fail(error.clone());
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner.state).active.is_some()
    }

    /// Requests waiting behind the active one, as (sets, gets).
    pub fn queued(&self) -> (usize, usize) {
        let state = lock(&self.inner.state);
        (state.set_queue.len(), state.get_queue.len())
    }
}

/// A request ready to send.
enum Outgoing {
    Set(PARAM_SET_DATA),
    Get(PARAM_REQUEST_READ_DATA),
}

/// The PARAM_VALUE fields the engine matches on.
struct Reply {
    name: ParamId,
    value: f32,
    param_type: u8,
}

impl Reply {
    /// Read a reply, keeping type tags the dialect does not name.
    fn from_frame(frame: &Frame) -> Option<Self> {
        match frame.parse::<PARAM_VALUE_DATA>() {
            Ok(msg) => Some(Self {
                name: ParamId::from_bytes(msg.param_id),
                value: msg.param_value,
                param_type: msg.param_type as u8,
            }),
            Err(FrameError::Parse(_)) => {
                // value f32, count u16, index u16, id [u8; 16], type u8
                let mut raw = [0u8; 25];
                let n = frame.payload.len().min(raw.len());
                raw[..n].copy_from_slice(&frame.payload[..n]);
                let mut name = [0u8; 16];
                name.copy_from_slice(&raw[8..24]);
                Some(Self {
                    name: ParamId::from_bytes(name),
                    value: f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
                    param_type: raw[24],
                })
            }
            Err(_) => None,
        }
    }
}

impl Inner {
    fn enqueue(&self, name: &str, request: Request) {
        if self.target_system_id == 0 {
            request.fail(EngineError::NoSystem);
            return;
        }
        let name_id = match ParamId::from_name(name) {
            Ok(id) => id,
            Err(err) => {
                request.fail(EngineError::WrongArgument(err.to_string()));
                return;
            }
        };

        let mut state = lock(&self.state);
        if state.closed {
            drop(state);
            debug!(param = name, "parameter engine closed");
            request.fail(EngineError::ConnectionError);
            return;
        }
        let is_set = matches!(request, Request::Set { .. });
        let queued = if is_set {
            state.set_queue.len()
        } else {
            state.get_queue.len()
        };
        if queued >= self.config.max_queued {
            drop(state);
            warn!(param = name, "parameter queue full");
            request.fail(EngineError::Busy);
            return;
        }

        state.next_id += 1;
        let work = Work {
            id: state.next_id,
            name: name_id,
            retries_remaining: self.config.retries,
            request,
        };
        if is_set {
            state.set_queue.push_back(work);
        } else {
            state.get_queue.push_back(work);
        }
    }

    fn message_for(&self, work: &Work) -> Outgoing {
        match &work.request {
            Request::Set { value, .. } => {
                let (param_value, param_type) = value.to_wire();
                Outgoing::Set(PARAM_SET_DATA {
                    param_value,
                    target_system: self.target_system_id,
                    target_component: self.target_component_id,
                    param_id: work.name.into_bytes(),
                    param_type,
                })
            }
            Request::Get { .. } => Outgoing::Get(PARAM_REQUEST_READ_DATA {
                param_index: -1,
                target_system: self.target_system_id,
                target_component: self.target_component_id,
                param_id: work.name.into_bytes(),
            }),
        }
    }

    fn arm(this: &Arc<Self>, id: u64) {
        let weak: Weak<Self> = Arc::downgrade(this);
        this.timeouts.register(this.token, this.config.timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_timeout(id);
            }
        });
    }

    fn transmit(&self, id: u64, outgoing: &Outgoing) {
        let sent = match outgoing {
            Outgoing::Set(msg) => self.outbound.send(msg),
            Outgoing::Get(msg) => self.outbound.send(msg),
        };
        if sent {
            return;
        }
        warn!("parameter request send failed");
        if let Some(work) = self.take_active(id) {
            work.request.fail(EngineError::ConnectionError);
        }
    }

    /// Remove the active request if it is still `id`, stopping its timer.
    fn take_active(&self, id: u64) -> Option<Work> {
        let mut state = lock(&self.state);
        match &state.active {
            Some(work) if work.id == id => {
                self.timeouts.cancel(self.token);
                state.active.take()
            }
            _ => None,
        }
    }

    fn handle_value(&self, msg: &Reply) {
        let work = {
            let mut state = lock(&self.state);
            match &state.active {
                Some(work) if work.name == msg.name => {
                    self.timeouts.cancel(self.token);
                    state.active.take()
                }
                _ => None,
            }
        };
        let Some(work) = work else {
            debug!(param = %msg.name.name(), "ignoring unrequested parameter value");
            return;
        };

        match work.request {
            Request::Set { callback, .. } => callback(Ok(())),
            Request::Get { callback } => {
                let result = ParamValue::from_wire(msg.value, msg.param_type)
                    .ok_or(EngineError::Unknown(msg.param_type));
                callback(result);
            }
        }
    }

    fn handle_timeout(self: &Arc<Self>, id: u64) {
        let mut state = lock(&self.state);
        let retry = match state.active.as_mut() {
            Some(work) if work.id == id => {
                if work.retries_remaining > 0 {
                    work.retries_remaining -= 1;
                    Some(self.message_for(work))
                } else {
                    None
                }
            }
            _ => return,
        };

        match retry {
            Some(outgoing) => {
                debug!("parameter request timed out, retrying");
                Inner::arm(self, id);
                drop(state);
                self.transmit(id, &outgoing);
            }
            None => {
                let work = state.active.take();
                drop(state);
                if let Some(work) = work {
                    warn!(param = %work.name.name(), "parameter request timed out");
                    work.request.fail(EngineError::Timeout);
                }
            }
        }
    }
}
