use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::Clock;
use crate::sync::lock;
use crate::token::Token;

/// Callback fired once when a deadline passes.
pub type TimeoutCallback = Box<dyn FnOnce() + Send>;

struct Entry {
    deadline: Instant,
    duration: Duration,
    callback: TimeoutCallback,
}

/// Deadlines keyed by owner token, polled from the worker tick.
///
/// Each token has at most one pending entry.
pub struct TimeoutScheduler {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Token, Entry>>,
}

impl TimeoutScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Arm a deadline `duration` from now, replacing any entry for `token`.
    pub fn register(
        &self,
        token: Token,
        duration: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) {
        let entry = Entry {
            deadline: self.clock.now() + duration,
            duration,
            callback: Box::new(callback),
        };
        if lock(&self.entries).insert(token, entry).is_some() {
            trace!(%token, "timeout replaced");
        }
    }

    /// Push the deadline out by the entry's original duration.
    ///
    /// Returns false if nothing is pending for `token`.
    pub fn refresh(&self, token: Token) -> bool {
        let now = self.clock.now();
        match lock(&self.entries).get_mut(&token) {
            Some(entry) => {
                entry.deadline = now + entry.duration;
                true
            }
            None => false,
        }
    }

    /// Drop the pending entry for `token`, if any.
    pub fn cancel(&self, token: Token) -> bool {
        lock(&self.entries).remove(&token).is_some()
    }

    pub fn is_pending(&self, token: Token) -> bool {
        lock(&self.entries).contains_key(&token)
    }

    /// Fire at most one expired entry, the one that expired first.
    ///
    /// The entry leaves the table before its callback runs, so the callback
    /// may register again under the same token.
    pub fn tick(&self) -> bool {
        let now = self.clock.now();
        let expired = {
            let mut entries = lock(&self.entries);
            let token = entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .min_by_key(|(_, entry)| entry.deadline)
                .map(|(token, _)| *token);
            token.and_then(|token| entries.remove(&token))
        };

        match expired {
            Some(entry) => {
                (entry.callback)();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;
    use crate::token::TokenAllocator;

    fn scheduler() -> (Arc<TimeoutScheduler>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(TimeoutScheduler::new(clock.clone()));
        (scheduler, clock)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        (hits, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn fires_after_deadline_only() {
        let (scheduler, clock) = scheduler();
        let token = TokenAllocator::new().allocate();
        let (hits, callback) = counter();

        scheduler.register(token, Duration::from_millis(100), callback);
        clock.advance(Duration::from_millis(99));
        assert!(!scheduler.tick());
        clock.advance(Duration::from_millis(1));
        assert!(scheduler.tick());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn register_replaces_existing_entry() {
        let (scheduler, clock) = scheduler();
        let token = TokenAllocator::new().allocate();
        let (first_hits, first) = counter();
        let (second_hits, second) = counter();

        scheduler.register(token, Duration::from_millis(100), first);
        scheduler.register(token, Duration::from_millis(300), second);
        assert_eq!(scheduler.len(), 1);

        clock.advance(Duration::from_millis(150));
        assert!(!scheduler.tick());

        clock.advance(Duration::from_millis(150));
        assert!(scheduler.tick());
        assert!(!scheduler.tick());
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_callback_per_tick() {
        let (scheduler, clock) = scheduler();
        let tokens = TokenAllocator::new();
        let (hits_a, a) = counter();
        let (hits_b, b) = counter();

        scheduler.register(tokens.allocate(), Duration::from_millis(10), a);
        scheduler.register(tokens.allocate(), Duration::from_millis(20), b);
        clock.advance(Duration::from_millis(50));

        assert!(scheduler.tick());
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 0);

        assert!(scheduler.tick());
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
        assert!(!scheduler.tick());
    }

    #[test]
    fn cancel_and_refresh() {
        let (scheduler, clock) = scheduler();
        let tokens = TokenAllocator::new();
        let cancelled = tokens.allocate();
        let refreshed = tokens.allocate();
        let (cancel_hits, a) = counter();
        let (refresh_hits, b) = counter();

        scheduler.register(cancelled, Duration::from_millis(100), a);
        scheduler.register(refreshed, Duration::from_millis(100), b);
        assert!(scheduler.cancel(cancelled));
        assert!(!scheduler.cancel(cancelled));

        clock.advance(Duration::from_millis(80));
        assert!(scheduler.refresh(refreshed));
        clock.advance(Duration::from_millis(80));
        assert!(!scheduler.tick());
        clock.advance(Duration::from_millis(20));
        assert!(scheduler.tick());

        assert_eq!(cancel_hits.load(Ordering::SeqCst), 0);
        assert_eq!(refresh_hits.load(Ordering::SeqCst), 1);
        assert!(!scheduler.refresh(refreshed));
    }

    #[test]
    fn callback_can_rearm_same_token() {
        let (scheduler, clock) = scheduler();
        let token = TokenAllocator::new().allocate();
        let (hits, callback) = counter();

        let inner = Arc::clone(&scheduler);
        scheduler.register(token, Duration::from_millis(10), move || {
            inner.register(token, Duration::from_millis(10), callback);
        });

        clock.advance(Duration::from_millis(10));
        assert!(scheduler.tick());
        assert!(scheduler.is_pending(token));
        clock.advance(Duration::from_millis(10));
        assert!(scheduler.tick());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
