use std::sync::{Arc, Mutex};

use crate::sync::lock;
use crate::token::Token;

/// Connection lifecycle of a remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The system's identity is known. Fires once per system.
    Discovered {
        uuid: u64,
        system_id: u8,
        component_id: u8,
    },
    /// Heartbeats stopped arriving. Fires once per loss.
    ConnectionLost { uuid: u64 },
    /// A heartbeat arrived after a loss.
    Reconnected { uuid: u64 },
}

impl SystemEvent {
    pub fn uuid(&self) -> u64 {
        match *self {
            Self::Discovered { uuid, .. }
            | Self::ConnectionLost { uuid }
            | Self::Reconnected { uuid } => uuid,
        }
    }
}

pub type EventCallback = Arc<dyn Fn(&SystemEvent) + Send + Sync>;

/// Fan-out of [`SystemEvent`]s to subscribers.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<(Token, EventCallback)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, token: Token, callback: impl Fn(&SystemEvent) + Send + Sync + 'static) {
        lock(&self.subscribers).push((token, Arc::new(callback)));
    }

    pub fn unsubscribe(&self, token: Token) {
        lock(&self.subscribers).retain(|(owner, _)| *owner != token);
    }

    /// Deliver to every subscriber, outside the subscriber lock.
    pub fn emit(&self, event: &SystemEvent) {
        let subscribers: Vec<EventCallback> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(event);
        }
    }
}
