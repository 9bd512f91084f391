//! The global lock serializing execution of unmanaged code.
//!
//! A managed call may enter native code, which may call back into managed
//! code, which may enter native code again; one thread can therefore cross
//! the boundary several times within a single call chain, taking one lock
//! level per crossing. The lock is reentrant across that nesting and can be
//! fully drained in one step when a thread must give up native-code
//! execution rights, e.g. before parking on a blocking wait.

use std::sync::Arc;
use std::time::Instant;

use crate::error::SweepError;
use crate::gc::Collector;
use crate::metrics::GilMetrics;
use crate::sync::ReentrantLock;
use crate::tracer::Tracer;

/// The process-wide lock for threads running native code. Only one thread
/// can be executing unmanaged code at a time.
///
/// Constructed once at runtime startup and handed (behind an `Arc`) to every
/// component that crosses the managed/unmanaged boundary; it is never torn
/// down or reset.
pub struct Gil {
    lock: ReentrantLock,
    collector: Arc<dyn Collector>,
    metrics: Arc<GilMetrics>,
    tracer: Tracer,
}

/// Releases one lock level when dropped, so the unlock in [`Gil::release`]
/// runs on every exit path, including an unwinding sweep.
struct UnlockOnExit<'a>(&'a ReentrantLock);

impl Drop for UnlockOnExit<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// Restores a recorded nesting depth when dropped, so a blocking region
/// re-acquires its levels even if the blocked operation unwinds.
struct ReacquireOnExit<'a> {
    gil: &'a Gil,
    locks: usize,
}

impl Drop for ReacquireOnExit<'_> {
    fn drop(&mut self) {
        self.gil.acquire_many(self.locks);
    }
}

impl Gil {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self::with_metrics(collector, Arc::new(GilMetrics::new()))
    }

    /// Build a lock that records contention and sweep timings into a shared
    /// metrics instance.
    pub fn with_metrics(collector: Arc<dyn Collector>, metrics: Arc<GilMetrics>) -> Self {
        Self {
            lock: ReentrantLock::new(),
            collector,
            metrics,
            tracer: Tracer::new(),
        }
    }

    /// Block until the calling thread holds the lock, or bump its hold count
    /// without blocking if it already does.
    ///
    /// There is no timeout: a thread stays suspended until the current owner
    /// drains to zero. The surrounding runtime is responsible for never
    /// holding the lock while waiting on a thread that itself needs it.
    pub fn acquire(&self) {
        self.lock.lock(&self.metrics);
        if self.tracer.is_enabled() {
            self.tracer.trace_acquire(self.lock.hold_count());
        }
    }

    /// Acquire the lock `locks` times; a no-op for zero.
    ///
    /// After a blocking region finishes, the executing thread has to
    /// re-acquire every level it previously owned (call chains may have
    /// crossed the managed/unmanaged boundary several times). `locks` is
    /// normally derived from a prior [`release_all_locks`](Self::release_all_locks)
    /// count; passing an arbitrary value creates extra nested ownership the
    /// caller must later match with equal releases.
    pub fn acquire_many(&self, locks: usize) {
        for _ in 0..locks {
            self.acquire();
        }
    }

    /// Non-blocking acquire. Returns `true` on success, including the
    /// reentrant case where the calling thread already owns the lock.
    pub fn try_acquire(&self) -> bool {
        let entered = self.lock.try_lock();
        if entered && self.tracer.is_enabled() {
            self.tracer.trace_acquire(self.lock.hold_count());
        }
        entered
    }

    /// Decrease the hold count by one, running a collector sweep if this is
    /// the last level held by this thread.
    ///
    /// The sweep runs while the lock is still held, so no other thread can
    /// execute unmanaged code concurrently with it. The unlock itself then
    /// happens unconditionally: a failing sweep still releases the lock, and
    /// its error reaches the caller only afterwards.
    pub fn release(&self) -> Result<(), SweepError> {
        let last = self.lock.hold_count() == 1;
        if self.tracer.is_enabled() {
            self.tracer.trace_release(self.lock.hold_count(), last);
        }

        let _unlock = UnlockOnExit(&self.lock);
        if last {
            let start = Instant::now();
            let result = self.collector.cleanup();
            self.metrics.record_sweep(start.elapsed());
            if self.tracer.is_enabled() {
                self.tracer.trace_sweep(start.elapsed(), result.is_ok());
            }
            result?;
        }
        Ok(())
    }

    /// Fast unlocking without a collector sweep, regardless of the resulting
    /// depth.
    pub fn release_no_cleanup(&self) {
        if self.tracer.is_enabled() {
            self.tracer.trace_release(self.lock.hold_count(), false);
        }
        self.lock.unlock();
    }

    /// Release every level currently held by this thread, without running
    /// any collector sweep.
    ///
    /// Returns one more than the number of levels actually drained; this is
    /// the restoration count blocking-region callers feed back in later, and
    /// it is still 1 for a thread that held nothing. Compare against a prior
    /// [`hold_count`](Self::hold_count) rather than this value to learn how
    /// many levels were released.
    pub fn release_all_locks(&self) -> usize {
        let held = self.lock.hold_count();
        for _ in 0..held {
            self.release_no_cleanup();
        }
        if self.tracer.is_enabled() {
            self.tracer.trace_drain(held);
        }
        held + 1
    }

    /// Run `f` with the lock fully released, then restore the identical
    /// prior nesting depth before returning.
    ///
    /// `f` must not re-enter unmanaged code; it is intended for operations
    /// that would otherwise block every thread out of native execution
    /// (sleeps, joins, waits on managed conditions). The previous depth is
    /// restored on both the normal and the unwinding exit path.
    pub fn blocking_region<R>(&self, f: impl FnOnce() -> R) -> R {
        // The drain count is defined as levels-drained + 1.
        let locks = self.release_all_locks() - 1;
        let _reacquire = ReacquireOnExit { gil: self, locks };
        f()
    }

    /// The calling thread's current hold count; zero if it does not own the
    /// lock.
    pub fn hold_count(&self) -> usize {
        self.lock.hold_count()
    }

    /// Whether the calling thread currently owns the lock.
    pub fn is_owned(&self) -> bool {
        self.lock.is_owned_by_current_thread()
    }

    pub fn metrics(&self) -> &GilMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::NullCollector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCollector {
        sweeps: AtomicUsize,
    }

    impl CountingCollector {
        fn count(&self) -> usize {
            self.sweeps.load(Ordering::SeqCst)
        }
    }

    impl Collector for CountingCollector {
        fn cleanup(&self) -> Result<(), SweepError> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_gil() -> (Gil, Arc<CountingCollector>) {
        let collector = Arc::new(CountingCollector::default());
        (Gil::new(collector.clone()), collector)
    }

    #[test]
    fn test_nested_acquire_defers_sweep() {
        let (gil, collector) = counting_gil();

        gil.acquire();
        gil.acquire();
        assert_eq!(gil.hold_count(), 2);
        assert_eq!(collector.count(), 0);

        gil.release().unwrap();
        assert_eq!(gil.hold_count(), 1);
        assert_eq!(collector.count(), 0);

        gil.release().unwrap();
        assert_eq!(gil.hold_count(), 0);
        assert_eq!(collector.count(), 1);
    }

    #[test]
    fn test_final_release_sweeps_exactly_once() {
        let (gil, collector) = counting_gil();

        gil.acquire();
        gil.release().unwrap();
        assert_eq!(gil.hold_count(), 0);
        assert_eq!(collector.count(), 1);
    }

    #[test]
    fn test_release_no_cleanup_never_sweeps() {
        let (gil, collector) = counting_gil();

        gil.acquire();
        gil.release_no_cleanup();
        assert_eq!(gil.hold_count(), 0);
        assert_eq!(collector.count(), 0);
    }

    #[test]
    fn test_release_all_locks_returns_drained_plus_one() {
        let (gil, collector) = counting_gil();

        gil.acquire();
        gil.acquire();
        gil.acquire();
        assert_eq!(gil.release_all_locks(), 4);
        assert_eq!(gil.hold_count(), 0);
        assert!(!gil.is_owned());
        assert_eq!(collector.count(), 0);
    }

    #[test]
    fn test_release_all_locks_without_ownership_returns_one() {
        let (gil, collector) = counting_gil();

        assert_eq!(gil.release_all_locks(), 1);
        assert_eq!(gil.hold_count(), 0);
        assert_eq!(collector.count(), 0);
    }

    #[test]
    fn test_acquire_many_round_trip() {
        let gil = Gil::new(Arc::new(NullCollector));

        gil.acquire_many(0);
        assert_eq!(gil.hold_count(), 0);

        gil.acquire_many(5);
        assert_eq!(gil.hold_count(), 5);
        assert_eq!(gil.release_all_locks(), 6);
        assert_eq!(gil.hold_count(), 0);
    }

    #[test]
    fn test_try_acquire_is_reentrant() {
        let gil = Gil::new(Arc::new(NullCollector));

        gil.acquire();
        assert!(gil.try_acquire());
        assert_eq!(gil.hold_count(), 2);

        gil.release_no_cleanup();
        gil.release_no_cleanup();
    }

    #[test]
    fn test_blocking_region_restores_depth() {
        let (gil, collector) = counting_gil();

        gil.acquire();
        gil.acquire();
        let result = gil.blocking_region(|| {
            assert_eq!(gil.hold_count(), 0);
            "parked"
        });
        assert_eq!(result, "parked");
        assert_eq!(gil.hold_count(), 2);
        assert_eq!(collector.count(), 0);

        gil.release_no_cleanup();
        gil.release_no_cleanup();
    }

    #[test]
    fn test_blocking_region_without_ownership() {
        let gil = Gil::new(Arc::new(NullCollector));

        gil.blocking_region(|| ());
        assert_eq!(gil.hold_count(), 0);
    }

    #[test]
    fn test_metrics_record_sweeps() {
        let (gil, _) = counting_gil();

        gil.acquire();
        gil.release().unwrap();
        assert_eq!(gil.metrics().sweep_count.load(Ordering::Relaxed), 1);
    }
}
