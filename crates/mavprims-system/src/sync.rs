use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering the data if a previous holder panicked.
///
/// Callbacks never run under these locks, so a poisoned guard still holds
/// consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
