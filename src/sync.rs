//! Reentrant mutual exclusion for the native-code lock.
//!
//! `parking_lot` mutexes are not reentrant, so reentrancy is implemented
//! explicitly: an (owner, recursion count) pair guarded by a non-reentrant
//! mutex, with a condvar signalled when the owning thread drops its final
//! level.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Instant;

use crate::metrics::GilMetrics;

#[derive(Debug)]
struct LockState {
    /// Thread that currently owns the lock (`None` means unlocked)
    owner: Option<ThreadId>,
    /// Recursion count for nested acquisitions by the owning thread
    recursion: usize,
}

/// A reentrant lock with an externally observable hold count.
///
/// The owning thread may lock any number of times without blocking on
/// itself; every `lock` must eventually be matched by an `unlock`. The lock
/// becomes available to other threads exactly when the owner's recursion
/// count returns to zero.
#[derive(Debug)]
pub struct ReentrantLock {
    state: Mutex<LockState>,
    condvar: Condvar,
}

impl ReentrantLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                recursion: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Block until the calling thread owns the lock, then bump its hold
    /// count. Contended waits are timed and recorded into `metrics`.
    pub fn lock(&self, metrics: &GilMetrics) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.recursion += 1;
            return;
        }

        if state.owner.is_some() {
            let start_wait = Instant::now();
            while state.owner.is_some() {
                self.condvar.wait(&mut state);
            }
            metrics.record_lock_contention(start_wait.elapsed());
        }

        state.owner = Some(me);
        state.recursion = 1;
    }

    /// Non-blocking variant of [`lock`](Self::lock). Returns `false` if
    /// another thread owns the lock.
    pub fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match state.owner {
            None => {
                state.owner = Some(me);
                state.recursion = 1;
                true
            }
            Some(owner) if owner == me => {
                state.recursion += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Drop one level of ownership, waking one waiter if this was the last.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the lock.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner != Some(me) || state.recursion == 0 {
            panic!("unlock of a reentrant lock from a thread that does not own it");
        }

        state.recursion -= 1;
        if state.recursion == 0 {
            state.owner = None;
            self.condvar.notify_one();
        }
    }

    /// Hold count of the calling thread. Zero for every thread that is not
    /// the current owner.
    pub fn hold_count(&self) -> usize {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.recursion
        } else {
            0
        }
    }

    /// Whether the calling thread currently owns the lock.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.hold_count() > 0
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reentrant_lock_unlock() {
        let lock = ReentrantLock::new();
        let metrics = GilMetrics::new();

        lock.lock(&metrics);
        lock.lock(&metrics);
        assert_eq!(lock.hold_count(), 2);

        lock.unlock();
        assert_eq!(lock.hold_count(), 1);
        assert!(lock.is_owned_by_current_thread());

        lock.unlock();
        assert_eq!(lock.hold_count(), 0);
        assert!(!lock.is_owned_by_current_thread());
    }

    #[test]
    fn test_try_lock_is_reentrant() {
        let lock = ReentrantLock::new();
        assert!(lock.try_lock());
        assert!(lock.try_lock());
        assert_eq!(lock.hold_count(), 2);
        lock.unlock();
        lock.unlock();
    }

    #[test]
    fn test_try_lock_fails_across_threads() {
        let lock = Arc::new(ReentrantLock::new());
        let metrics = GilMetrics::new();
        lock.lock(&metrics);

        let contender = lock.clone();
        let acquired = std::thread::spawn(move || contender.try_lock())
            .join()
            .unwrap();
        assert!(!acquired);

        lock.unlock();
    }

    #[test]
    fn test_hold_count_is_zero_for_non_owner() {
        let lock = Arc::new(ReentrantLock::new());
        let metrics = GilMetrics::new();
        lock.lock(&metrics);

        let observer = lock.clone();
        let count = std::thread::spawn(move || observer.hold_count())
            .join()
            .unwrap();
        assert_eq!(count, 0);

        lock.unlock();
    }

    #[test]
    #[should_panic(expected = "does not own")]
    fn test_unlock_without_ownership_panics() {
        let lock = ReentrantLock::new();
        lock.unlock();
    }
}
