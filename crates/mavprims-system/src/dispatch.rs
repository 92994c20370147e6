use std::sync::{Arc, Mutex};

use mavprims_frame::Frame;

use crate::sync::lock;
use crate::token::Token;

/// Handler invoked for every inbound frame of one message id.
///
/// Runs on a link's receive thread and must not block.
pub type MessageHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

struct Entry {
    message_id: u32,
    token: Token,
    handler: MessageHandler,
}

/// Message id to handler registry, grouped by owner token.
#[derive(Default)]
pub struct DispatchTable {
    entries: Mutex<Vec<Entry>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `message_id` owned by `token`.
    ///
    /// Registering the same (id, token) pair twice delivers twice; owners
    /// are expected not to do that.
    pub fn register(
        &self,
        message_id: u32,
        token: Token,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) {
        lock(&self.entries).push(Entry {
            message_id,
            token,
            handler: Arc::new(handler),
        });
    }

    /// Remove every handler owned by `token`; returns how many were removed.
    pub fn unregister_all(&self, token: Token) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|entry| entry.token != token);
        before - entries.len()
    }

    /// Call every matching handler in registration order.
    ///
    /// Handlers are copied out first and called without the lock held, so a
    /// handler may register or unregister freely. Panics propagate.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let handlers: Vec<MessageHandler> = lock(&self.entries)
            .iter()
            .filter(|entry| entry.message_id == frame.message_id)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();
        for handler in &handlers {
            handler(frame);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mavprims_frame::ids;

    use super::*;
    use crate::token::TokenAllocator;

    fn frame(message_id: u32) -> Frame {
        Frame::new(1, 1, message_id, vec![0u8])
    }

    #[test]
    fn dispatch_in_registration_order() {
        let table = DispatchTable::new();
        let tokens = TokenAllocator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            table.register(ids::MSG_HEARTBEAT, tokens.allocate(), move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        assert_eq!(table.dispatch(&frame(ids::MSG_HEARTBEAT)), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_ids_are_called() {
        let table = DispatchTable::new();
        let token = TokenAllocator::new().allocate();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        table.register(ids::MSG_COMMAND_ACK, token, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(table.dispatch(&frame(ids::MSG_HEARTBEAT)), 0);
        assert_eq!(table.dispatch(&frame(ids::MSG_COMMAND_ACK)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_all_keeps_other_owners() {
        let table = DispatchTable::new();
        let tokens = TokenAllocator::new();
        let plugin = tokens.allocate();
        let other = tokens.allocate();
        let other_hits = Arc::new(AtomicUsize::new(0));

        table.register(ids::MSG_HEARTBEAT, plugin, |_| {});
        table.register(ids::MSG_STATUSTEXT, plugin, |_| {});
        let counter = Arc::clone(&other_hits);
        table.register(ids::MSG_HEARTBEAT, other, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(table.unregister_all(plugin), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.dispatch(&frame(ids::MSG_HEARTBEAT)), 1);
        assert_eq!(other_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let table = Arc::new(DispatchTable::new());
        let tokens = Arc::new(TokenAllocator::new());
        let token = tokens.allocate();

        let inner = Arc::clone(&table);
        table.register(ids::MSG_HEARTBEAT, token, move |_| {
            inner.register(ids::MSG_STATUSTEXT, token, |_| {});
        });

        table.dispatch(&frame(ids::MSG_HEARTBEAT));
        assert_eq!(table.len(), 2);
    }
}
