//! Debug-only same-thread reentrancy detection for locked containers.
//!
//! `parking_lot` mutexes are not reentrant: a thread that locks a
//! `MutexedList` it already holds (for example from inside a `with_list`
//! closure) deadlocks silently. In debug builds the list records which
//! thread holds its lock and panics on such a nested entry instead. In
//! release builds this compiles to a zero-cost no-op.

#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicUsize, Ordering};

#[cfg(debug_assertions)]
fn current_thread_token() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    std::thread_local! {
        static TOKEN: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|t| *t)
}

/// Per-instance holder tracker. Call [`check`](Self::check) before taking
/// the lock and keep the guard from [`enter`](Self::enter) alongside the
/// lock guard.
#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    #[cfg(debug_assertions)]
    holder: AtomicUsize,
}

impl DebugReentrancy {
    /// Const so it can be a field default.
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            holder: AtomicUsize::new(0),
        }
    }

    /// Panics in debug builds if the calling thread already holds the lock.
    #[inline]
    pub(crate) fn check(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.holder.load(Ordering::Relaxed) != current_thread_token(),
                "reentrancy detected: nested lock of a guarded list on the same thread"
            );
        }
    }

    /// Record the calling thread as holder. Only call while holding the lock.
    #[inline]
    pub(crate) fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            self.holder.store(current_thread_token(), Ordering::Relaxed);
        }
        ReentrancyGuard { owner: self }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`; clears the holder on drop.
pub(crate) struct ReentrancyGuard<'a> {
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    owner: &'a DebugReentrancy,
}

impl ReentrancyGuard<'_> {
    /// Re-record the holder after a condition-variable wait, during which
    /// other threads may have held the lock.
    #[inline]
    pub(crate) fn rearm(&self) {
        #[cfg(debug_assertions)]
        {
            self.owner
                .holder
                .store(current_thread_token(), Ordering::Relaxed);
        }
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.holder.store(0, Ordering::Relaxed);
        }
    }
}
