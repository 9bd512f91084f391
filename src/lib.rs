//! # native-gil
//!
//! Global interpreter lock for the native-extension bridge of a managed
//! runtime. The [`Gil`] keeps locks for threads running native code: only
//! one thread can be executing unmanaged code at a time, a thread may hold
//! the lock reentrantly across nested managed/unmanaged boundary crossings,
//! and dropping the last held level triggers a [`Collector`] sweep of
//! native-side resources while exclusive execution rights are still held.

pub mod error;
pub mod gc;
pub mod gil;
pub mod metrics;
pub mod sync;
pub mod tracer;

pub use error::SweepError;
pub use gc::{Collector, NullCollector};
pub use gil::Gil;
pub use metrics::GilMetrics;
pub use sync::ReentrantLock;
