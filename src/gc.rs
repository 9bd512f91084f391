//! Seam to the external garbage collector.
//!
//! Releasing the last lock level a thread holds triggers a sweep of
//! native-side resources. The sweep itself lives behind [`Collector`]; this
//! crate only decides *when* it runs, never *what* it does.

use crate::error::SweepError;

/// A collection sweep over native-side resources.
///
/// `cleanup` is only ever invoked while the calling thread still holds the
/// global lock, so implementations never observe unmanaged code executing
/// concurrently with the sweep.
pub trait Collector: Send + Sync {
    fn cleanup(&self) -> Result<(), SweepError>;
}

/// No-op collector for runtimes with no native handle table to sweep.
#[derive(Debug, Default)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn cleanup(&self) -> Result<(), SweepError> {
        Ok(())
    }
}
