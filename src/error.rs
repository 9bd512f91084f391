use thiserror::Error;

/// Failure raised by a collector sweep during a final release.
///
/// By the time this reaches the caller, the lock has already been released.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("collector sweep failed: {0}")]
pub struct SweepError(pub String);

impl SweepError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
