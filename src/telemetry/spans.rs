//! Span utilities for worker execution.

use tracing::{info_span, Span};

use crate::scheduler::{WorkHandle, WorkOutcome};

/// Extension trait for recording outcomes on spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record a generator outcome and its elapsed time.
    fn record_outcome<T>(&self, outcome: &WorkOutcome<T>, elapsed_ms: u64);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_outcome<T>(&self, outcome: &WorkOutcome<T>, elapsed_ms: u64) {
        self.record_result(outcome);
        self.record("elapsed_ms", elapsed_ms);
    }
}

/// Factory for the span wrapping one generator run.
pub struct WorkSpan;

impl WorkSpan {
    /// Fields included:
    /// - `work_id`, `category`, `priority`: from the handle
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    /// - `elapsed_ms`: filled in after the generator returns
    pub fn new(handle: &WorkHandle) -> Span {
        info_span!(
            "work_item",
            work_id = handle.id().0,
            category = %handle.category(),
            priority = %handle.priority(),
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    }
}
