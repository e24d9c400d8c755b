//! Metrics facade recording for dispatcher events.
//!
//! Emits through the `metrics` crate; without an installed recorder these
//! calls are no-ops.

use ::metrics::{counter, gauge, histogram};

use crate::scheduler::Category;

pub fn record_submitted(category: Category) {
    counter!("dispatch_submitted_total", "category" => category.as_str()).increment(1);
}

/// Record a delivery and its submit-to-callback latency.
pub fn record_delivered(category: Category, latency_ms: f64) {
    counter!("dispatch_delivered_total", "category" => category.as_str()).increment(1);
    histogram!("dispatch_latency_ms", "category" => category.as_str()).record(latency_ms);
}

pub fn record_failed(category: Category) {
    counter!("dispatch_failed_total", "category" => category.as_str()).increment(1);
}

pub fn record_cancelled(category: Category, count: u64) {
    counter!("dispatch_cancelled_total", "category" => category.as_str()).increment(count);
}

pub fn record_timed_out(category: Category) {
    counter!("dispatch_timed_out_total", "category" => category.as_str()).increment(1);
}

/// A worker finished after its handle was cancelled or expired.
pub fn record_discarded(category: Category) {
    counter!("dispatch_discarded_total", "category" => category.as_str()).increment(1);
}

/// Submissions not yet delivered or cancelled.
pub fn record_pending(pending: usize) {
    gauge!("dispatch_pending").set(pending as f64);
}
