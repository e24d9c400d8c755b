//! Error types for the dispatcher.
//!
//! `DispatchError` is returned to the submitting caller. `WorkError` travels
//! with a single request and is handed to that request's callback; it never
//! affects other requests or the drain loop.

use thiserror::Error;

/// Errors returned by dispatcher operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker pool is shut down")]
    PoolShutdown,

    #[error("Worker pool queue is full")]
    QueueFull,

    #[error("Invalid drain rate: {0} Hz (must be finite and > 0)")]
    InvalidDrainRate(f64),
}

/// Per-request failure delivered to the completion callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    #[error("Generator failed: {0}")]
    GeneratorFailed(String),

    #[error("Generator panicked: {0}")]
    GeneratorPanicked(String),

    #[error("Work timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

impl WorkError {
    /// Returns true if the generator itself reported or caused the failure.
    pub fn is_generator_fault(&self) -> bool {
        matches!(self, Self::GeneratorFailed(_) | Self::GeneratorPanicked(_))
    }
}

/// Outcome handed to a completion callback.
pub type WorkOutcome<T> = Result<T, WorkError>;
