//! Telemetry for the dispatcher.
//!
//! Provides structured logging, worker spans, and metrics recording.

mod logging;
pub mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use spans::{SpanExt, WorkSpan};
