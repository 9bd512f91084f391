use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct GilMetrics {
    /// Number of times a thread had to block waiting for the lock
    pub lock_contention_count: AtomicU64,
    /// Total time spent waiting for the lock (in microseconds)
    pub lock_contention_total_us: AtomicU64,
    /// Number of collector sweeps triggered by a final release
    pub sweep_count: AtomicU64,
    /// Total time spent in collector sweeps (in microseconds)
    pub sweep_total_us: AtomicU64,
}

impl GilMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lock_contention(&self, duration: Duration) {
        self.lock_contention_count.fetch_add(1, Ordering::Relaxed);
        self.lock_contention_total_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_sweep(&self, duration: Duration) {
        self.sweep_count.fetch_add(1, Ordering::Relaxed);
        self.sweep_total_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }
}
