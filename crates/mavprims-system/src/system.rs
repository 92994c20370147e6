//! One remote participant and its worker thread.
//!
//! [`SystemCore`] holds everything a system owns: the dispatch table, the
//! timeout scheduler, both engines and the heartbeat/identity state. It is
//! driven by [`SystemCore::handle_frame`] from link receive threads and by
//! [`SystemCore::tick`] from the worker. [`System`] pairs a core with the
//! worker thread that ticks it.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mavprims_frame::{
    ground_station_heartbeat, ids, is_armed, status_text_string, Frame, MessageData,
    AUTOPILOT_VERSION_DATA, EXTENDED_SYS_STATE_DATA, HEARTBEAT_DATA, STATUSTEXT_DATA,
};
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::commands::{Command, CommandEngine};
use crate::config::SystemConfig;
use crate::dispatch::DispatchTable;
use crate::error::{CommandResult, EngineError, ParamResult};
use crate::events::{EventHub, SystemEvent};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatTransition, IdentityAction, IdentityResolver};
use crate::params::{ParamEngine, ParamValue};
use crate::periodic::PeriodicScheduler;
use crate::plugin::Plugin;
use crate::sender::Outbound;
use crate::sync::lock;
use crate::timeout::TimeoutScheduler;
use crate::token::{Token, TokenAllocator};

struct SystemState {
    heartbeat: HeartbeatMonitor,
    identity: IdentityResolver,
    discovered: bool,
    armed: bool,
    landed_state: u8,
    last_heartbeat_sent: Option<Instant>,
}

/// Shared state of one remote system.
pub struct SystemCore {
    system_id: u8,
    component_id: u8,
    config: SystemConfig,
    clock: Arc<dyn Clock>,
    outbound: Outbound,
    tokens: TokenAllocator,
    dispatch: DispatchTable,
    timeouts: Arc<TimeoutScheduler>,
    periodic: PeriodicScheduler,
    commands: CommandEngine,
    params: ParamEngine,
    events: Arc<EventHub>,
    state: Mutex<SystemState>,
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    core_token: Token,
}

impl SystemCore {
    /// Build a core for `(system_id, component_id)` and register its own handlers.
    ///
    /// `system_id == 0` builds the placeholder: it routes nothing and both
    /// engines answer `NoSystem`.
    pub fn new(
        system_id: u8,
        component_id: u8,
        config: SystemConfig,
        clock: Arc<dyn Clock>,
        outbound: Outbound,
        events: Arc<EventHub>,
    ) -> Arc<Self> {
        let tokens = TokenAllocator::new();
        let core_token = tokens.allocate();
        let timeouts = Arc::new(TimeoutScheduler::new(Arc::clone(&clock)));
        let commands = CommandEngine::new(
            system_id,
            component_id,
            config.command.clone(),
            outbound.clone(),
            Arc::clone(&timeouts),
            tokens.allocate(),
        );
        let params = ParamEngine::new(
            system_id,
            component_id,
            config.param.clone(),
            outbound.clone(),
            Arc::clone(&timeouts),
            tokens.allocate(),
        );
        let state = SystemState {
            heartbeat: HeartbeatMonitor::new(config.heartbeat_timeout),
            identity: IdentityResolver::new(
                system_id,
                ids::is_autopilot(component_id),
                config.autopilot_version_attempts,
                config.autopilot_version_window,
            ),
            discovered: false,
            armed: false,
            landed_state: ids::LANDED_STATE_UNDEFINED,
            last_heartbeat_sent: None,
        };

        let periodic = PeriodicScheduler::new(Arc::clone(&clock));
        let core = Arc::new(Self {
            system_id,
            component_id,
            config,
            clock,
            outbound,
            tokens,
            dispatch: DispatchTable::new(),
            timeouts,
            periodic,
            commands,
            params,
            events,
            state: Mutex::new(state),
            plugins: Mutex::new(Vec::new()),
            core_token,
        });
        core.register_core_handlers();
        core
    }

    fn register_core_handlers(self: &Arc<Self>) {
        let token = self.core_token;
        self.register_core(ids::MSG_HEARTBEAT, token, Self::on_heartbeat);
        self.register_core(ids::MSG_COMMAND_ACK, token, |core, frame| {
            core.commands.on_command_ack(frame)
        });
        self.register_core(ids::MSG_PARAM_VALUE, token, |core, frame| {
            core.params.on_param_value(frame)
        });
        self.register_core(ids::MSG_AUTOPILOT_VERSION, token, Self::on_autopilot_version);
        self.register_core(ids::MSG_EXTENDED_SYS_STATE, token, Self::on_extended_sys_state);
        self.register_core(ids::MSG_STATUSTEXT, token, Self::on_status_text);
    }

    /// Register a handler that holds the core weakly.
    fn register_core(
        self: &Arc<Self>,
        message_id: u32,
        token: Token,
        handler: impl Fn(&Arc<Self>, &Frame) + Send + Sync + 'static,
    ) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.dispatch.register(message_id, token, move |frame| {
            if let Some(core) = weak.upgrade() {
                handler(&core, frame);
            }
        });
    }

    // --- inbound ---

    /// Deliver one inbound frame to every registered handler.
    pub fn handle_frame(&self, frame: &Frame) -> usize {
        trace!(
            system_id = self.system_id,
            message = ids::message_name(frame.message_id),
            "dispatching frame"
        );
        self.dispatch.dispatch(frame)
    }

    fn on_heartbeat(self: &Arc<Self>, frame: &Frame) {
        // Liveness counts even when a field is outside the dialect's enums.
        let armed = frame
            .parse::<HEARTBEAT_DATA>()
            .map(|heartbeat| is_armed(&heartbeat))
            .ok();
        let now = self.clock.now();
        let (transition, discovered, uuid) = {
            let mut state = lock(&self.state);
            let transition = state.heartbeat.on_heartbeat(now);
            state.identity.on_heartbeat();
            if let (Some(armed), true) = (armed, ids::is_autopilot(self.component_id)) {
                state.armed = armed;
            }
            (transition, state.discovered, self.uuid_in(&state))
        };

        if transition == HeartbeatTransition::Reconnected {
            info!(system_id = self.system_id, uuid, "heartbeat resumed");
            self.events.emit(&SystemEvent::Reconnected { uuid });
            if discovered {
                self.for_each_plugin(|plugin| plugin.enable());
            }
        }
    }

    fn on_autopilot_version(self: &Arc<Self>, frame: &Frame) {
        let Ok(version) = frame.parse::<AUTOPILOT_VERSION_DATA>() else {
            return;
        };
        let resolved = lock(&self.state).identity.on_autopilot_version(version.uid);
        if let Some(uuid) = resolved {
            self.mark_discovered(uuid);
        }
    }

    fn on_extended_sys_state(self: &Arc<Self>, frame: &Frame) {
        if let Ok(state) = frame.parse::<EXTENDED_SYS_STATE_DATA>() {
            lock(&self.state).landed_state = state.landed_state as u8;
        }
    }

    fn on_status_text(self: &Arc<Self>, frame: &Frame) {
        let Ok(status) = frame.parse::<STATUSTEXT_DATA>() else {
            return;
        };
        let text = status_text_string(&status);
        let system_id = self.system_id;
        match status.severity as u8 {
            0..=3 => error!(system_id, text = %text, "status"),
            4 => warn!(system_id, text = %text, "status"),
            5 | 6 => info!(system_id, text = %text, "status"),
            _ => debug!(system_id, text = %text, "status"),
        }
    }

    fn mark_discovered(&self, uuid: u64) {
        {
            let mut state = lock(&self.state);
            if state.discovered {
                return;
            }
            state.discovered = true;
        }
        info!(
            system_id = self.system_id,
            component = ids::component_name(self.component_id),
            uuid,
            "system discovered"
        );
        self.events.emit(&SystemEvent::Discovered {
            uuid,
            system_id: self.system_id,
            component_id: self.component_id,
        });
        self.for_each_plugin(|plugin| plugin.enable());
    }

    // --- worker ---

    /// One worker cycle.
    ///
    /// Sends our heartbeat when due, fires at most one expired timeout and
    /// every due periodic call, checks for heartbeat loss, advances identity
    /// resolution and lets each engine put its next request on the wire.
    pub fn tick(self: &Arc<Self>) {
        let now = self.clock.now();
        self.send_heartbeat_if_due(now);
        self.timeouts.tick();
        self.periodic.tick();
        self.check_connection(now);
        self.poll_identity(now);
        self.commands.do_work();
        self.params.do_work();
    }

    /// How long the worker sleeps between ticks.
    pub fn tick_period(&self) -> Duration {
        if self.is_connected() {
            self.config.tick_connected
        } else {
            self.config.tick_disconnected
        }
    }

    fn send_heartbeat_if_due(&self, now: Instant) {
        {
            let mut state = lock(&self.state);
            let due = match state.last_heartbeat_sent {
                Some(sent) => now.saturating_duration_since(sent) >= self.config.heartbeat_interval,
                None => true,
            };
            if !due {
                return;
            }
            state.last_heartbeat_sent = Some(now);
        }
        if !self.outbound.send(&ground_station_heartbeat()) {
            trace!(system_id = self.system_id, "heartbeat not sent");
        }
    }

    fn check_connection(&self, now: Instant) {
        let (lost, discovered, uuid) = {
            let mut state = lock(&self.state);
            let lost = state.heartbeat.check(now);
            (lost, state.discovered, self.uuid_in(&state))
        };
        if !lost {
            return;
        }
        warn!(system_id = self.system_id, uuid, "heartbeat lost");
        self.events.emit(&SystemEvent::ConnectionLost { uuid });
        if discovered {
            self.for_each_plugin(|plugin| plugin.disable());
        }
    }

    fn poll_identity(self: &Arc<Self>, now: Instant) {
        let action = lock(&self.state).identity.poll(now);
        match action {
            IdentityAction::Wait => {}
            IdentityAction::Resolve(uuid) => self.mark_discovered(uuid),
            IdentityAction::RequestVersion => {
                debug!(system_id = self.system_id, "requesting autopilot version");
                let weak = Arc::downgrade(self);
                let request = Command::new(ids::CMD_REQUEST_AUTOPILOT_CAPABILITIES).param(1, 1.0);
                self.commands.queue_command(request, move |result| {
                    let Some(core) = weak.upgrade() else {
                        return;
                    };
                    let now = core.clock.now();
                    let mut state = lock(&core.state);
                    match result {
                        Ok(()) => state.identity.on_request_accepted(now),
                        Err(_) => state.identity.on_request_failed(),
                    }
                });
            }
        }
    }

    // --- substrate for plugins ---

    pub fn allocate_token(&self) -> Token {
        self.tokens.allocate()
    }

    /// Call `handler` for every inbound frame with `message_id`.
    ///
    /// The handler runs on a link receive thread and must not block.
    pub fn register_handler(
        &self,
        message_id: u32,
        token: Token,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) {
        self.dispatch.register(message_id, token, handler);
    }

    pub fn unregister_all(&self, token: Token) -> usize {
        self.dispatch.unregister_all(token)
    }

    /// Arm a one-shot timeout, replacing any pending one for `token`.
    pub fn register_timeout(
        &self,
        token: Token,
        duration: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) {
        self.timeouts.register(token, duration, callback);
    }

    pub fn refresh_timeout(&self, token: Token) -> bool {
        self.timeouts.refresh(token)
    }

    pub fn cancel_timeout(&self, token: Token) -> bool {
        self.timeouts.cancel(token)
    }

    /// Call `callback` on the worker every `interval`, starting with the next
    /// tick. Replaces any periodic call registered for `token`.
    pub fn add_call_every(
        &self,
        token: Token,
        interval: Duration,
        callback: impl Fn() + Send + Sync + 'static,
    ) {
        self.periodic.add(token, interval, callback);
    }

    pub fn change_call_every(&self, token: Token, interval: Duration) -> bool {
        self.periodic.change(token, interval)
    }

    /// Restart the period of `token`'s call from now.
    pub fn reset_call_every(&self, token: Token) -> bool {
        self.periodic.reset(token)
    }

    pub fn remove_call_every(&self, token: Token) -> bool {
        self.periodic.remove(token)
    }

    /// Send a message stamped with our own ids to every link.
    pub fn send_message<M: MessageData>(&self, msg: &M) -> bool {
        self.outbound.send(msg)
    }

    // --- engines ---

    pub fn queue_command(
        &self,
        command: Command,
        callback: impl FnOnce(CommandResult) + Send + 'static,
    ) {
        self.commands.queue_command(command, callback);
    }

    /// Blocks until the command resolves. Not for use inside handlers.
    pub fn send_command(&self, command: Command) -> CommandResult {
        self.commands.send_command(command)
    }

    pub fn set_param_async(
        &self,
        name: &str,
        value: ParamValue,
        callback: impl FnOnce(ParamResult<()>) + Send + 'static,
    ) {
        self.params.set_param_async(name, value, callback);
    }

    pub fn get_param_async(
        &self,
        name: &str,
        callback: impl FnOnce(ParamResult<ParamValue>) + Send + 'static,
    ) {
        self.params.get_param_async(name, callback);
    }

    pub fn set_param(&self, name: &str, value: ParamValue) -> ParamResult<()> {
        self.params.set_param(name, value)
    }

    pub fn get_param(&self, name: &str) -> ParamResult<ParamValue> {
        self.params.get_param(name)
    }

    /// Ask the system to stream `message_id` at `rate_hz`; zero stops it.
    ///
    /// `component_id` selects another component of the same system, such as
    /// a camera; `None` targets this system's own component.
    pub fn set_message_rate(
        &self,
        message_id: u32,
        rate_hz: f32,
        component_id: Option<u8>,
    ) -> CommandResult {
        self.send_command(message_rate_command(message_id, rate_hz, component_id)?)
    }

    pub fn set_message_rate_async(
        &self,
        message_id: u32,
        rate_hz: f32,
        component_id: Option<u8>,
        callback: impl FnOnce(CommandResult) + Send + 'static,
    ) {
        match message_rate_command(message_id, rate_hz, component_id) {
            Ok(command) => self.queue_command(command, callback),
            Err(err) => callback(Err(err)),
        }
    }

    pub fn commands(&self) -> &CommandEngine {
        &self.commands
    }

    pub fn params(&self) -> &ParamEngine {
        &self.params
    }

    // --- plugins ---

    /// Attach a plugin. It is initialised now and enabled right away if the
    /// system is already discovered and connected.
    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) {
        plugin.init(self);
        if self.is_discovered() && self.is_connected() {
            plugin.enable();
        }
        debug!(system_id = self.system_id, plugin = plugin.name(), "plugin added");
        lock(&self.plugins).push(plugin);
    }

    fn for_each_plugin(&self, f: impl Fn(&dyn Plugin)) {
        let plugins: Vec<Arc<dyn Plugin>> = lock(&self.plugins).clone();
        for plugin in &plugins {
            f(plugin.as_ref());
        }
    }

    /// Disable and deinitialise every plugin, fail every pending command and
    /// parameter request, and drop timeouts and periodic calls.
    ///
    /// Requests made after shutdown fail at once with `ConnectionError`.
    pub fn shutdown(&self) {
        let plugins: Vec<Arc<dyn Plugin>> = std::mem::take(&mut *lock(&self.plugins));
        for plugin in &plugins {
            plugin.disable();
            plugin.deinit(self);
        }
        self.commands.fail_all(EngineError::ConnectionError);
        self.params.fail_all(EngineError::ConnectionError);
        self.timeouts.clear();
        self.periodic.clear();
    }

    // --- state ---

    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    pub fn component_id(&self) -> u8 {
        self.component_id
    }

    /// Resolved identity, or the system id while unresolved.
    pub fn uuid(&self) -> u64 {
        self.uuid_in(&lock(&self.state))
    }

    fn uuid_in(&self, state: &SystemState) -> u64 {
        state
            .identity
            .resolved()
            .unwrap_or(u64::from(self.system_id))
    }

    pub fn is_placeholder(&self) -> bool {
        self.system_id == 0
    }

    pub fn is_discovered(&self) -> bool {
        lock(&self.state).discovered
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).heartbeat.is_connected()
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.state).armed
    }

    /// Last EXTENDED_SYS_STATE landed state (`ids::LANDED_STATE_*`).
    pub fn landed_state(&self) -> u8 {
        lock(&self.state).landed_state
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        lock(&self.state).heartbeat.last_heartbeat()
    }
}

fn message_rate_command(
    message_id: u32,
    rate_hz: f32,
    component_id: Option<u8>,
) -> Result<Command, EngineError> {
    if !rate_hz.is_finite() || rate_hz < 0.0 {
        return Err(EngineError::WrongArgument(format!(
            "invalid message rate {rate_hz}"
        )));
    }
    let interval_us = if rate_hz == 0.0 {
        -1.0
    } else {
        1_000_000.0 / rate_hz
    };
    let command = Command::new(ids::CMD_SET_MESSAGE_INTERVAL)
        .param(1, message_id as f32)
        .param(2, interval_us);
    Ok(match component_id {
        Some(component_id) => command.target_component(component_id),
        None => command,
    })
}

/// A [`SystemCore`] with its worker thread.
///
/// Dereferences to the core. Dropping the system stops the worker.
pub struct System {
    core: Arc<SystemCore>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl System {
    /// Start the worker thread for `core`.
    pub fn spawn(core: Arc<SystemCore>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let worker = {
            let core = Arc::clone(&core);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("mavprims-system-{}", core.system_id()))
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        core.tick();
                        thread::park_timeout(core.tick_period());
                    }
                })?
        };
        Ok(Self {
            core,
            running,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn core(&self) -> &Arc<SystemCore> {
        &self.core
    }

    /// Stop the worker and shut the core down. Safe to call twice.
    pub fn shutdown(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        worker.thread().unpark();
        if worker.thread().id() != thread::current().id() && worker.join().is_err() {
            error!(system_id = self.core.system_id(), "system worker panicked");
        }
        self.core.shutdown();
    }

    #[cfg(feature = "async")]
    pub fn send_command_future(
        &self,
        command: Command,
    ) -> impl std::future::Future<Output = CommandResult> + Send + 'static {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.core.queue_command(command, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(EngineError::ConnectionError)) }
    }

    #[cfg(feature = "async")]
    pub fn set_param_future(
        &self,
        name: &str,
        value: ParamValue,
    ) -> impl std::future::Future<Output = ParamResult<()>> + Send + 'static {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.core.set_param_async(name, value, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(EngineError::ConnectionError)) }
    }

    #[cfg(feature = "async")]
    pub fn get_param_future(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = ParamResult<ParamValue>> + Send + 'static {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.core.get_param_async(name, move |result| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(EngineError::ConnectionError)) }
    }
}

impl Deref for System {
    type Target = SystemCore;

    fn deref(&self) -> &SystemCore {
        &self.core
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown();
    }
}
