//! Scheduler construction errors.

use thiserror::Error;

/// Errors raised when building a scheduler from invalid configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A cycle needs at least one bucket.
    #[error("cycle size must be greater than zero")]
    ZeroCycleSize,

    /// The tick interval must be non-zero.
    #[error("tick frequency must be greater than zero")]
    ZeroFrequency,
}
