use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque owner identity for handler and timeout registrations.
///
/// Only compared for equality; never reused within one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// Hands out unique tokens.
#[derive(Debug)]
pub struct TokenAllocator {
    next: AtomicU64,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> Token {
        Token(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TokenAllocator {
    fn default() -> Self {
        Self::new()
    }
}
