use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex, Weak};
use std::time::Duration;

use mavlink::common::MavCmd;
use mavprims_frame::{ids, Frame, FrameError, COMMAND_ACK_DATA, COMMAND_LONG_DATA};
use num_traits::FromPrimitive;
use tracing::{debug, info, warn};

use crate::config::CommandConfig;
use crate::error::{CommandResult, EngineError};
use crate::sender::Outbound;
use crate::sync::lock;
use crate::timeout::TimeoutScheduler;
use crate::token::Token;

/// Completion callback; called exactly once.
pub type CommandCallback = Box<dyn FnOnce(CommandResult) + Send>;

/// A COMMAND_LONG to send to the system's components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub command: u16,
    pub params: [f32; 7],
    /// Defaults to the component the engine belongs to.
    pub target_component: Option<u8>,
}

impl Command {
    pub fn new(command: u16) -> Self {
        Self {
            command,
            params: [0.0; 7],
            target_component: None,
        }
    }

    pub fn with_params(mut self, params: [f32; 7]) -> Self {
        self.params = params;
        self
    }

    /// Set parameter `index` (1 to 7).
    pub fn param(mut self, index: usize, value: f32) -> Self {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.params.get_mut(i)) {
            *slot = value;
        }
        self
    }

    pub fn target_component(mut self, component_id: u8) -> Self {
        self.target_component = Some(component_id);
        self
    }

    fn to_message(
        self,
        target_system: u8,
        target_component: u8,
    ) -> Result<COMMAND_LONG_DATA, EngineError> {
        let command = MavCmd::from_u16(self.command).ok_or_else(|| {
            EngineError::WrongArgument(format!("command {} is not in the dialect", self.command))
        })?;
        let [param1, param2, param3, param4, param5, param6, param7] = self.params;
        Ok(COMMAND_LONG_DATA {
            param1,
            param2,
            param3,
            param4,
            param5,
            param6,
            param7,
            command,
            target_system,
            target_component,
            confirmation: 0,
        })
    }
}

/// Lifecycle of the command at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    Waiting,
    TemporarilyRejected,
    Done,
    Failed,
}

struct Work {
    id: u64,
    command: u16,
    message: COMMAND_LONG_DATA,
    retries_remaining: u32,
    timeout: Duration,
    state: CommandState,
    callback: Option<CommandCallback>,
}

impl Work {
    /// Whether an ack sent by `component_id` can answer this command.
    fn answered_by(&self, component_id: u8) -> bool {
        let target = self.message.target_component;
        target == ids::COMP_ID_ALL || target == component_id
    }
}

#[derive(Default)]
struct EngineState {
    queue: VecDeque<Work>,
    next_id: u64,
    /// Set by `fail_all`; later requests fail at once.
    closed: bool,
}

struct Inner {
    target_system_id: u8,
    target_component_id: u8,
    config: CommandConfig,
    outbound: Outbound,
    timeouts: Arc<TimeoutScheduler>,
    token: Token,
    state: Mutex<EngineState>,
}

/// Fields of a COMMAND_ACK as raw numbers.
#[derive(Debug, Clone, Copy)]
struct Ack {
    command: u16,
    result: u8,
    progress: u8,
}

impl Ack {
    /// Read an ack, keeping result codes the dialect does not name.
    fn from_frame(frame: &Frame) -> Option<Self> {
        match frame.parse::<COMMAND_ACK_DATA>() {
            Ok(ack) => Some(Self {
                command: ack.command as u16,
                result: ack.result as u8,
                progress: ack.progress,
            }),
            Err(FrameError::Parse(_)) => {
                let raw = &frame.payload;
                let byte = |at: usize| raw.get(at).copied().unwrap_or(0);
                Some(Self {
                    command: u16::from_le_bytes([byte(0), byte(1)]),
                    result: byte(2),
                    progress: byte(3),
                })
            }
            Err(_) => None,
        }
    }
}

/// Sends commands one at a time and matches acknowledgements to them.
///
/// Requests queue FIFO behind the one in flight. `do_work` is driven by the
/// owning system's worker tick; acks arrive through `on_command_ack`.
pub struct CommandEngine {
    inner: Arc<Inner>,
}

impl CommandEngine {
    pub fn new(
        target_system_id: u8,
        target_component_id: u8,
        config: CommandConfig,
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

    /// Queue a command; `callback` receives the final result.
    pub fn queue_command(
        &self,
        command: Command,
        callback: impl FnOnce(CommandResult) + Send + 'static,
    ) {
        let inner = &self.inner;
        if inner.target_system_id == 0 {
            callback(Err(EngineError::NoSystem));
            return;
        }

        let target_component = command
            .target_component
            .unwrap_or(inner.target_component_id);
        let message = match command.to_message(inner.target_system_id, target_component) {
            Ok(message) => message,
            Err(err) => {
                callback(Err(err));
                return;
            }
        };

        let mut state = lock(&inner.state);
        if state.closed {
            drop(state);
            debug!(command = command.command, "command engine closed");
            callback(Err(EngineError::ConnectionError));
            return;
        }
        if state.queue.len() >= inner.config.max_queued {
            drop(state);
            warn!(command = command.command, "command queue full");
            callback(Err(EngineError::Busy));
            return;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.queue.push_back(Work {
            id,
            command: command.command,
            message,
            retries_remaining: inner.config.retries,
            timeout: inner.config.timeout,
            state: CommandState::Idle,
            callback: Some(Box::new(callback)),
        });
    }

    /// Send a command and block until it resolves.
    ///
    /// Must not be called from a message handler or the worker thread.
    pub fn send_command(&self, command: Command) -> CommandResult {
        let (tx, rx) = mpsc::sync_channel(1);
        self.queue_command(command, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().unwrap_or(Err(EngineError::ConnectionError))
    }

    /// Advance the head of the queue. Called once per worker tick.
    pub fn do_work(&self) {
        let inner = &self.inner;
        let mut state = lock(&inner.state);
        loop {
            let Some(head) = state.queue.front_mut() else {
                return;
            };
            let current = head.state;
            match current {
                CommandState::Done | CommandState::Failed => {
                    state.queue.pop_front();
                }
                CommandState::Waiting | CommandState::TemporarilyRejected => return,
                CommandState::Idle => {
                    head.state = CommandState::Waiting;
                    let (id, message, timeout) = (head.id, head.message.clone(), head.timeout);
                    Inner::arm(inner, id, timeout);
                    drop(state);

                    debug!(
                        system_id = inner.target_system_id,
                        command = message.command as u16,
                        "sending command"
                    );
                    inner.transmit(id, &message);
                    return;
                }
            }
        }
    }

    /// Handle a COMMAND_ACK sent by one of the target system's components.
    pub fn on_command_ack(&self, frame: &Frame) {
        let Some(ack) = Ack::from_frame(frame) else {
            return;
        };
        self.inner.handle_ack(frame.component_id, ack);
    }

    /// Fail every queued and in-flight command with `error` and refuse new ones.
    ///
    /// Callbacks run after the engine lock is released.
    pub fn fail_all(&self, error: EngineError) {
        let inner = &self.inner;
        let drained: Vec<Work> = {
            let mut state = lock(&inner.state);
            state.closed = true;
            state.queue.drain(..).collect()
        };
        inner.timeouts.cancel(inner.token);
        let callbacks: Vec<CommandCallback> = drained
            .into_iter()
            .filter_map(|mut work| work.callback.take())
            .collect();
        if !callbacks.is_empty() {
            debug!(
                system_id = inner.target_system_id,
                pending = callbacks.len(),
                %error,
                "failing pending commands"
            );
        }
        for callback in callbacks {
            callback(Err(error.clone()));
        }
    }

    /// State of the command currently at the head of the queue.
    pub fn head_state(&self) -> Option<CommandState> {
        lock(&self.inner.state).queue.front().map(|work| work.state)
    }

    pub fn queued(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }
}

impl Inner {
    fn arm(this: &Arc<Self>, id: u64, after: Duration) {
        let weak: Weak<Self> = Arc::downgrade(this);
        this.timeouts.register(this.token, after, move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_timeout(id);
            }
        });
    }

    /// Send a frame for work `id`; a local failure ends the command.
    fn transmit(self: &Arc<Self>, id: u64, message: &COMMAND_LONG_DATA) {
        if self.outbound.send(message) {
            return;
        }
        warn!(command = message.command as u16, "command send failed");
        let callback = {
            let mut state = lock(&self.state);
            match state.queue.front_mut() {
                Some(head) if head.id == id => self.finish(head, CommandState::Failed),
                _ => None,
            }
        };
        if let Some(callback) = callback {
            callback(Err(EngineError::ConnectionError));
        }
    }

    /// Mark `work` terminal, stop its timer and take its callback.
    fn finish(&self, work: &mut Work, state: CommandState) -> Option<CommandCallback> {
        work.state = state;
        self.timeouts.cancel(self.token);
        work.callback.take()
    }

    fn handle_ack(self: &Arc<Self>, from_component: u8, ack: Ack) {
        let (callback, result) = {
            let mut state = lock(&self.state);
            let Some(head) = state.queue.front_mut() else {
                return;
            };
            let in_flight = matches!(
                head.state,
                CommandState::Waiting | CommandState::TemporarilyRejected
            );
            if !in_flight || head.command != ack.command || !head.answered_by(from_component) {
                debug!(
                    command = ack.command,
                    component_id = from_component,
                    "ignoring ack for a command not in flight"
                );
                return;
            }

            match ack.result {
                ids::RESULT_ACCEPTED => (self.finish(head, CommandState::Done), Ok(())),
                ids::RESULT_TEMPORARILY_REJECTED => {
                    debug!(command = ack.command, "command temporarily rejected");
                    head.state = CommandState::TemporarilyRejected;
                    return;
                }
                ids::RESULT_IN_PROGRESS => {
                    debug!(command = ack.command, progress = ack.progress, "command in progress");
                    head.state = CommandState::Waiting;
                    let patience = head.timeout * head.retries_remaining.max(1);
                    let id = head.id;
                    Inner::arm(self, id, patience);
                    return;
                }
                ids::RESULT_DENIED
                | ids::RESULT_UNSUPPORTED
                | ids::RESULT_FAILED
                | ids::RESULT_CANCELLED => {
                    info!(command = ack.command, result = ack.result, "command denied");
                    (
                        self.finish(head, CommandState::Failed),
                        Err(EngineError::CommandDenied),
                    )
                }
                other => {
                    warn!(command = ack.command, result = other, "unknown command result");
                    (
                        self.finish(head, CommandState::Failed),
                        Err(EngineError::Unknown(other)),
                    )
                }
            }
        };
        if let Some(callback) = callback {
            callback(result);
        }
    }

    fn handle_timeout(self: &Arc<Self>, id: u64) {
        let mut state = lock(&self.state);
        let Some(head) = state.queue.front_mut() else {
            return;
        };
        if head.id != id {
            return;
        }
        let rejected = match head.state {
            CommandState::Waiting => false,
            CommandState::TemporarilyRejected => true,
            _ => return,
        };

        if head.retries_remaining > 0 {
            head.retries_remaining -= 1;
            head.state = CommandState::Waiting;
            let (message, timeout) = (head.message.clone(), head.timeout);
            debug!(
                command = head.command,
                retries_remaining = head.retries_remaining,
                "command timed out, retrying"
            );
            Inner::arm(self, id, timeout);
            drop(state);
            self.transmit(id, &message);
            return;
        }

        let command = head.command;
        let callback = self.finish(head, CommandState::Failed);
        drop(state);
        let result = if rejected {
            info!(command, "command still rejected after retries");
            Err(EngineError::CommandDenied)
        } else {
            warn!(command, "command timed out");
            Err(EngineError::Timeout)
        };
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mavprims_frame::MessageData;

    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::RecordingSender;
    use crate::token::TokenAllocator;

    struct Harness {
        clock: Arc<ManualClock>,
        sender: Arc<RecordingSender>,
        timeouts: Arc<TimeoutScheduler>,
        engine: CommandEngine,
        results: Arc<Mutex<Vec<CommandResult>>>,
    }

    impl Harness {
        fn new(retries: u32, timeout_ms: u64) -> Self {
            let clock = Arc::new(ManualClock::new());
            let sender = Arc::new(RecordingSender::new(clock.clone()));
            let timeouts = Arc::new(TimeoutScheduler::new(clock.clone()));
            let config = CommandConfig {
                timeout: Duration::from_millis(timeout_ms),
                retries,
                max_queued: 4,
            };
            let engine = CommandEngine::new(
                1,
                1,
                config,
                Outbound::new(sender.clone(), 245, 190),
                timeouts.clone(),
                TokenAllocator::new().allocate(),
            );
            Self {
                clock,
                sender,
                timeouts,
                engine,
                results: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn queue(&self, command: u16) {
            let results = Arc::clone(&self.results);
            self.engine
                .queue_command(Command::new(command).param(1, 1.0), move |result| {
                    results.lock().unwrap().push(result);
                });
        }

        /// One worker cycle.
        fn tick(&self) {
            self.timeouts.tick();
            self.engine.do_work();
        }

        fn advance(&self, ms: u64) {
            self.clock.advance(Duration::from_millis(ms));
            self.tick();
        }

        fn ack(&self, command: u16, result: u8) {
            self.ack_from(1, command, result);
        }

        /// COMMAND_ACK from component `component_id`, built byte-wise so
        /// result codes outside the dialect can be sent too.
        fn ack_from(&self, component_id: u8, command: u16, result: u8) {
            let [lo, hi] = command.to_le_bytes();
            let frame = Frame::new(1, component_id, COMMAND_ACK_DATA::ID, vec![lo, hi, result]);
            self.engine.on_command_ack(&frame);
        }

        fn results(&self) -> Vec<CommandResult> {
            self.results.lock().unwrap().clone()
        }
    }

    #[test]
    fn accepted_after_single_send() {
        let h = Harness::new(3, 500);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        h.advance(5_000);

        assert_eq!(h.results(), vec![Ok(())]);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 1);
        assert_eq!(h.engine.queued(), 0);

        let sent: COMMAND_LONG_DATA = h.sender.frames()[0].1.parse().unwrap();
        assert_eq!(sent.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
        assert_eq!(sent.target_system, 1);
        assert_eq!(sent.target_component, 1);
        assert_eq!(sent.param1, 1.0);
    }

    #[test]
    fn no_ack_times_out_after_all_retries() {
        let h = Harness::new(2, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        for _ in 0..40 {
            h.advance(10);
        }

        let times: Vec<Duration> = h
            .sender
            .frames()
            .iter()
            .filter(|(_, frame)| frame.message_id == COMMAND_LONG_DATA::ID)
            .map(|(at, _)| *at)
            .collect();
        assert_eq!(
            times,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200)
            ]
        );
        assert_eq!(h.results(), vec![Err(EngineError::Timeout)]);
    }

    #[test]
    fn timeout_reported_exactly_once_at_final_deadline() {
        let h = Harness::new(2, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.advance(100);
        h.advance(100);
        h.advance(99);
        assert!(h.results().is_empty());
        h.advance(1);
        assert_eq!(h.results(), vec![Err(EngineError::Timeout)]);
        h.advance(1_000);
        assert_eq!(h.results().len(), 1);
    }

    #[test]
    fn in_progress_extends_deadline() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_IN_PROGRESS);

        // 3 retries remain, so patience is 300 ms instead of 100 ms.
        h.advance(150);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 1);
        assert_eq!(h.engine.head_state(), Some(CommandState::Waiting));

        h.advance(150);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 2);

        for _ in 0..10 {
            h.advance(100);
        }
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 4);
        assert_eq!(h.results(), vec![Err(EngineError::Timeout)]);
    }

    #[test]
    fn in_progress_with_no_retries_left_still_waits_one_period() {
        let h = Harness::new(0, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.advance(50);
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_IN_PROGRESS);
        h.advance(60);
        assert!(h.results().is_empty());
        h.advance(40);
        assert_eq!(h.results(), vec![Err(EngineError::Timeout)]);
    }

    #[test]
    fn temporarily_rejected_retries_then_denied() {
        let h = Harness::new(1, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_TEMPORARILY_REJECTED);
        assert!(h.results().is_empty());

        h.advance(100);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 2);
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_TEMPORARILY_REJECTED);
        h.advance(100);

        assert_eq!(h.results(), vec![Err(EngineError::CommandDenied)]);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 2);
    }

    #[test]
    fn temporarily_rejected_then_accepted_on_retry() {
        let h = Harness::new(2, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_TEMPORARILY_REJECTED);
        h.advance(100);
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        assert_eq!(h.results(), vec![Ok(())]);
    }

    #[test]
    fn denied_results_are_terminal() {
        for code in [
            ids::RESULT_DENIED,
            ids::RESULT_UNSUPPORTED,
            ids::RESULT_FAILED,
            ids::RESULT_CANCELLED,
        ] {
            let h = Harness::new(3, 100);
            h.queue(ids::CMD_COMPONENT_ARM_DISARM);
            h.tick();
            h.ack(ids::CMD_COMPONENT_ARM_DISARM, code);
            h.advance(1_000);
            assert_eq!(h.results(), vec![Err(EngineError::CommandDenied)]);
            assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 1);
        }
    }

    #[test]
    fn unknown_result_is_not_success() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, 42);
        assert_eq!(h.results(), vec![Err(EngineError::Unknown(42))]);
    }

    #[test]
    fn second_command_waits_for_first() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.queue(ids::CMD_SET_MESSAGE_INTERVAL);
        h.tick();
        h.tick();
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 1);

        // An ack for the queued command is stale until it is in flight.
        h.ack(ids::CMD_SET_MESSAGE_INTERVAL, ids::RESULT_ACCEPTED);
        assert!(h.results().is_empty());

        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        h.tick();
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 2);
        let second: COMMAND_LONG_DATA = h.sender.frames()[1].1.parse().unwrap();
        assert_eq!(second.command as u16, ids::CMD_SET_MESSAGE_INTERVAL);

        h.ack(ids::CMD_SET_MESSAGE_INTERVAL, ids::RESULT_ACCEPTED);
        assert_eq!(h.results(), vec![Ok(()), Ok(())]);
    }

    #[test]
    fn duplicate_ack_is_ignored() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_DENIED);
        assert_eq!(h.results(), vec![Ok(())]);

        h.tick();
        h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_DENIED);
        assert_eq!(h.results(), vec![Ok(()), Err(EngineError::CommandDenied)]);
    }

    #[test]
    fn send_failure_is_connection_error() {
        let h = Harness::new(3, 100);
        h.sender.set_failing(true);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        assert_eq!(h.results(), vec![Err(EngineError::ConnectionError)]);
        assert!(!h.timeouts.is_pending(h.engine.inner.token));
        h.tick();
        assert_eq!(h.engine.queued(), 0);
    }

    #[test]
    fn full_queue_is_busy() {
        let h = Harness::new(3, 100);
        for _ in 0..5 {
            h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        }
        assert_eq!(h.results(), vec![Err(EngineError::Busy)]);
        assert_eq!(h.engine.queued(), 4);
    }

    #[test]
    fn placeholder_system_has_no_route() {
        let clock = Arc::new(ManualClock::new());
        let sender = Arc::new(RecordingSender::new(clock.clone()));
        let engine = CommandEngine::new(
            0,
            0,
            CommandConfig::default(),
            Outbound::new(sender.clone(), 245, 190),
            Arc::new(TimeoutScheduler::new(clock)),
            TokenAllocator::new().allocate(),
        );
        let result = engine.send_command(Command::new(ids::CMD_COMPONENT_ARM_DISARM));
        assert_eq!(result, Err(EngineError::NoSystem));
        assert!(sender.frames().is_empty());
    }

    #[test]
    fn blocking_send_resolves_from_another_thread() {
        let h = Arc::new(Harness::new(3, 100));
        let worker = {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                while h.sender.count(COMMAND_LONG_DATA::ID) == 0 {
                    h.tick();
                    std::thread::yield_now();
                }
                h.ack(ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
            })
        };
        let result = h
            .engine
            .send_command(Command::new(ids::CMD_COMPONENT_ARM_DISARM));
        worker.join().unwrap();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn typed_ack_resolves_command() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        let ack = COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            result: mavlink::common::MavResult::MAV_RESULT_ACCEPTED,
            ..COMMAND_ACK_DATA::default()
        };
        h.engine.on_command_ack(&Frame::from_message(1, 1, &ack));
        assert_eq!(h.results(), vec![Ok(())]);
    }

    #[test]
    fn ack_from_other_component_is_ignored() {
        let h = Harness::new(0, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.tick();
        h.ack_from(ids::COMP_ID_CAMERA, ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        assert!(h.results().is_empty());
        h.advance(100);
        assert_eq!(h.results(), vec![Err(EngineError::Timeout)]);
    }

    #[test]
    fn ack_from_targeted_component_resolves() {
        let h = Harness::new(3, 100);
        let results = Arc::clone(&h.results);
        h.engine.queue_command(
            Command::new(ids::CMD_COMPONENT_ARM_DISARM).target_component(ids::COMP_ID_CAMERA),
            move |result| results.lock().unwrap().push(result),
        );
        h.tick();
        h.ack_from(1, ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        assert!(h.results().is_empty());
        h.ack_from(ids::COMP_ID_CAMERA, ids::CMD_COMPONENT_ARM_DISARM, ids::RESULT_ACCEPTED);
        assert_eq!(h.results(), vec![Ok(())]);
    }

    #[test]
    fn command_outside_dialect_is_wrong_argument() {
        let h = Harness::new(3, 100);
        h.queue(60_000);
        assert!(matches!(
            h.results().as_slice(),
            [Err(EngineError::WrongArgument(_))]
        ));
        assert_eq!(h.engine.queued(), 0);
    }

    #[test]
    fn fail_all_drains_queue_and_in_flight() {
        let h = Harness::new(3, 100);
        h.queue(ids::CMD_COMPONENT_ARM_DISARM);
        h.queue(ids::CMD_SET_MESSAGE_INTERVAL);
        h.tick();
        assert_eq!(h.engine.head_state(), Some(CommandState::Waiting));

        h.engine.fail_all(EngineError::ConnectionError);
        assert_eq!(
            h.results(),
            vec![
                Err(EngineError::ConnectionError),
                Err(EngineError::ConnectionError)
            ]
        );
        assert_eq!(h.engine.queued(), 0);
        assert!(!h.timeouts.is_pending(h.engine.inner.token));

        // Nothing left to retry or time out.
        h.advance(1_000);
        assert_eq!(h.results().len(), 2);
        assert_eq!(h.sender.count(COMMAND_LONG_DATA::ID), 1);
    }

    #[test]
    fn closed_engine_refuses_new_commands() {
        let h = Harness::new(3, 100);
        h.engine.fail_all(EngineError::ConnectionError);
        let result = h
            .engine
            .send_command(Command::new(ids::CMD_COMPONENT_ARM_DISARM));
        assert_eq!(result, Err(EngineError::ConnectionError));
        assert_eq!(h.engine.queued(), 0);
    }

    #[test]
    fn command_builder() {
        let command = Command::new(ids::CMD_SET_MESSAGE_INTERVAL)
            .param(1, 33.0)
            .param(2, 100_000.0)
            .param(8, 9.0)
            .target_component(ids::COMP_ID_CAMERA);
        assert_eq!(command.params, [33.0, 100_000.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(command.target_component, Some(ids::COMP_ID_CAMERA));
    }
}
