//! Liveness and identity bookkeeping for one remote system.
//!
//! Both types are plain state machines fed with timestamps; the owning
//! system decides what to send and which events to emit.

use std::time::{Duration, Instant};

/// What a received heartbeat changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTransition {
    /// First heartbeat ever seen.
    First,
    /// First heartbeat after a detected loss.
    Reconnected,
    /// Ordinary refresh.
    Refreshed,
}

/// Heartbeat timestamps and the edge-triggered loss flag.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_heartbeat: Option<Instant>,
    timed_out: bool,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_heartbeat: None,
            timed_out: false,
        }
    }

    pub fn on_heartbeat(&mut self, now: Instant) -> HeartbeatTransition {
        let transition = match (self.last_heartbeat, self.timed_out) {
            (None, _) => HeartbeatTransition::First,
            (Some(_), true) => HeartbeatTransition::Reconnected,
            (Some(_), false) => HeartbeatTransition::Refreshed,
        };
        self.last_heartbeat = Some(now);
        self.timed_out = false;
        transition
    }

    /// Returns true exactly once per loss: on the first check past the timeout.
    pub fn check(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_heartbeat else {
            return false;
        };
        if self.timed_out || now.saturating_duration_since(last) <= self.timeout {
            return false;
        }
        self.timed_out = true;
        true
    }

    pub fn is_connected(&self) -> bool {
        self.last_heartbeat.is_some() && !self.timed_out
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }
}

/// Heartbeats a non-autopilot component must send before it is identified.
pub const NON_AUTOPILOT_HEARTBEATS: u32 = 2;

/// Next step of identity resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityAction {
    Wait,
    /// Ask the autopilot for AUTOPILOT_VERSION.
    RequestVersion,
    /// Identity settled on this value.
    Resolve(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    /// A version request is queued or awaiting its ack.
    InFlight,
    /// The request was accepted at this time; the reply is still due.
    AwaitingReply(Instant),
}

/// Works out the unique identity of a system.
///
/// Autopilots are asked for AUTOPILOT_VERSION and identified by its `uid`;
/// other components, and autopilots that never answer, fall back to the
/// system id.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    system_id: u8,
    is_autopilot: bool,
    max_attempts: u32,
    reply_window: Duration,
    heartbeats: u32,
    attempts: u32,
    pending: Pending,
    resolved: Option<u64>,
}

impl IdentityResolver {
    pub fn new(system_id: u8, is_autopilot: bool, max_attempts: u32, reply_window: Duration) -> Self {
        Self {
            system_id,
            is_autopilot,
            max_attempts,
            reply_window,
            heartbeats: 0,
            attempts: 0,
            pending: Pending::Idle,
            resolved: None,
        }
    }

    pub fn on_heartbeat(&mut self) {
        self.heartbeats = self.heartbeats.saturating_add(1);
    }

    pub fn resolved(&self) -> Option<u64> {
        self.resolved
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide what to do now. A `Resolve` is returned once.
    pub fn poll(&mut self, now: Instant) -> IdentityAction {
        if self.resolved.is_some() || self.heartbeats == 0 {
            return IdentityAction::Wait;
        }

        if !self.is_autopilot {
            if self.heartbeats >= NON_AUTOPILOT_HEARTBEATS {
                return self.resolve(u64::from(self.system_id));
            }
            return IdentityAction::Wait;
        }

        match self.pending {
            Pending::InFlight => return IdentityAction::Wait,
            Pending::AwaitingReply(since)
                if now.saturating_duration_since(since) < self.reply_window =>
            {
                return IdentityAction::Wait;
            }
            _ => {}
        }

        if self.attempts >= self.max_attempts {
            return self.resolve(u64::from(self.system_id));
        }
        self.attempts += 1;
        self.pending = Pending::InFlight;
        IdentityAction::RequestVersion
    }

    /// The version request was acknowledged; the reply should follow.
    pub fn on_request_accepted(&mut self, now: Instant) {
        if self.pending == Pending::InFlight {
            self.pending = Pending::AwaitingReply(now);
        }
    }

    /// The version request failed; the next poll may try again.
    pub fn on_request_failed(&mut self) {
        if self.pending == Pending::InFlight {
            self.pending = Pending::Idle;
        }
    }

    /// AUTOPILOT_VERSION arrived. Returns the identity if this settled it.
    pub fn on_autopilot_version(&mut self, uid: u64) -> Option<u64> {
        if self.resolved.is_some() {
            return None;
        }
        let uuid = if uid != 0 {
            uid
        } else {
            u64::from(self.system_id)
        };
        match self.resolve(uuid) {
            IdentityAction::Resolve(uuid) => Some(uuid),
            _ => None,
        }
    }

    fn resolve(&mut self, uuid: u64) -> IdentityAction {
        self.resolved = Some(uuid);
        self.pending = Pending::Idle;
        IdentityAction::Resolve(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn loss_fires_once_per_gap() {
        let start = Instant::now();
        let mut monitor = HeartbeatMonitor::new(TIMEOUT);
        assert!(!monitor.check(start + Duration::from_secs(10)));

        assert_eq!(monitor.on_heartbeat(start), HeartbeatTransition::First);
        assert!(monitor.is_connected());
        assert!(!monitor.check(start + TIMEOUT));
        assert!(monitor.check(start + TIMEOUT + Duration::from_millis(1)));
        assert!(!monitor.check(start + Duration::from_secs(10)));
        assert!(!monitor.is_connected());

        let back = start + Duration::from_secs(11);
        assert_eq!(monitor.on_heartbeat(back), HeartbeatTransition::Reconnected);
        assert_eq!(
            monitor.on_heartbeat(back + Duration::from_secs(1)),
            HeartbeatTransition::Refreshed
        );
        assert!(monitor.check(back + Duration::from_secs(5)));
    }

    #[test]
    fn non_autopilot_resolves_after_two_heartbeats() {
        let now = Instant::now();
        let mut identity = IdentityResolver::new(42, false, 3, Duration::from_millis(500));
        assert_eq!(identity.poll(now), IdentityAction::Wait);
        identity.on_heartbeat();
        assert_eq!(identity.poll(now), IdentityAction::Wait);
        identity.on_heartbeat();
        assert_eq!(identity.poll(now), IdentityAction::Resolve(42));
        assert_eq!(identity.poll(now), IdentityAction::Wait);
        assert_eq!(identity.resolved(), Some(42));
    }

    #[test]
    fn autopilot_uses_uid() {
        let now = Instant::now();
        let mut identity = IdentityResolver::new(1, true, 3, Duration::from_millis(500));
        identity.on_heartbeat();
        assert_eq!(identity.poll(now), IdentityAction::RequestVersion);
        assert_eq!(identity.poll(now), IdentityAction::Wait);
        identity.on_request_accepted(now);
        assert_eq!(identity.on_autopilot_version(0xDEAD_BEEF), Some(0xDEAD_BEEF));
        assert_eq!(identity.on_autopilot_version(0x1234), None);
        assert_eq!(identity.resolved(), Some(0xDEAD_BEEF));
    }

    #[test]
    fn zero_uid_falls_back_to_system_id() {
        let mut identity = IdentityResolver::new(3, true, 3, Duration::from_millis(500));
        identity.on_heartbeat();
        assert_eq!(identity.on_autopilot_version(0), Some(3));
    }

    #[test]
    fn autopilot_gives_up_after_max_attempts() {
        let start = Instant::now();
        let window = Duration::from_millis(500);
        let mut identity = IdentityResolver::new(7, true, 3, window);
        identity.on_heartbeat();

        let mut now = start;
        for attempt in 1..=3 {
            assert_eq!(identity.poll(now), IdentityAction::RequestVersion);
            assert_eq!(identity.attempts(), attempt);
            identity.on_request_accepted(now);
            assert_eq!(identity.poll(now + window / 2), IdentityAction::Wait);
            now += window;
        }
        assert_eq!(identity.poll(now), IdentityAction::Resolve(7));
    }

    #[test]
    fn failed_request_retries_immediately() {
        let now = Instant::now();
        let mut identity = IdentityResolver::new(1, true, 3, Duration::from_millis(500));
        identity.on_heartbeat();
        assert_eq!(identity.poll(now), IdentityAction::RequestVersion);
        identity.on_request_failed();
        assert_eq!(identity.poll(now), IdentityAction::RequestVersion);
        assert_eq!(identity.attempts(), 2);
    }
}
