use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::Clock;
use crate::sync::lock;
use crate::token::Token;

/// Callback fired every period until removed.
pub type PeriodicCallback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    interval: Duration,
    /// When the entry last fired; `None` until the first run.
    last: Option<Instant>,
    callback: PeriodicCallback,
}

impl Entry {
    fn is_due(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Advance by one interval, or restart from `now` if more than one
    /// interval was missed.
    fn advance(&mut self, now: Instant) {
        let next = match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval * 2 => {
                last + self.interval
            }
            _ => now,
        };
        self.last = Some(next);
    }
}

/// Repeating callbacks keyed by owner token, polled from the worker tick.
///
/// Each token has at most one entry. A new entry runs on the first tick after
/// it is added, then once per interval.
pub struct PeriodicScheduler {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Token, Entry>>,
}

impl PeriodicScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Call `callback` every `interval`, replacing any entry for `token`.
    pub fn add(
        &self,
        token: Token,
        interval: Duration,
        callback: impl Fn() + Send + Sync + 'static,
    ) {
        let entry = Entry {
            interval,
            last: None,
            callback: Arc::new(callback),
        };
        if lock(&self.entries).insert(token, entry).is_some() {
            trace!(%token, "periodic call replaced");
        }
    }

    /// Change the interval; the next run is due one new interval after the last.
    pub fn change(&self, token: Token, interval: Duration) -> bool {
        match lock(&self.entries).get_mut(&token) {
            Some(entry) => {
                entry.interval = interval;
                true
            }
            None => false,
        }
    }

    /// Restart the period from now, postponing the next run.
    pub fn reset(&self, token: Token) -> bool {
        let now = self.clock.now();
        match lock(&self.entries).get_mut(&token) {
            Some(entry) => {
                entry.last = Some(now);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, token: Token) -> bool {
        lock(&self.entries).remove(&token).is_some()
    }

    pub fn contains(&self, token: Token) -> bool {
        lock(&self.entries).contains_key(&token)
    }

    /// Run every due entry once. Returns how many ran.
    ///
    /// Due callbacks are taken out of the table before any of them runs, so
    /// a callback may add, change or remove entries, its own included.
    pub fn tick(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<PeriodicCallback> = {
            let mut entries = lock(&self.entries);
            entries
                .values_mut()
                .filter(|entry| entry.is_due(now))
                .map(|entry| {
                    entry.advance(now);
                    Arc::clone(&entry.callback)
                })
                .collect()
        };
        for callback in &due {
            callback();
        }
        due.len()
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
