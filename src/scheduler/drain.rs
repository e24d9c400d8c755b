//! Drain cadence: the rate limit on main-thread delivery.
//!
//! At most one result is delivered per tick, so the tick rate bounds the
//! per-frame cost of callbacks on the consuming thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::error::DispatchError;

/// Default drain cadence.
pub const DEFAULT_DRAIN_HZ: f64 = 50.0;

/// Upper bound on the drain cadence. Faster rates are clamped.
pub const MAX_DRAIN_HZ: f64 = 10_000.0;

/// Shared, adjustable tick interval.
///
/// Stored as nanoseconds so readers on other threads never see a torn value.
/// A new rate applies to the next scheduled tick.
#[derive(Debug)]
pub struct DrainRate {
    interval_nanos: AtomicU64,
}

impl DrainRate {
    pub fn new(hz: f64) -> Result<Self, DispatchError> {
        let rate = Self { interval_nanos: AtomicU64::new(0) };
        rate.set_hz(hz)?;
        Ok(rate)
    }

    /// Change the cadence. Rejects zero, negative, and non-finite rates.
    pub fn set_hz(&self, hz: f64) -> Result<(), DispatchError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(DispatchError::InvalidDrainRate(hz));
        }
        let hz = hz.min(MAX_DRAIN_HZ);
        let nanos = (1_000_000_000.0 / hz).round() as u64;
        self.interval_nanos.store(nanos.max(1), Ordering::Release);
        Ok(())
    }

    /// Current cadence in ticks per second.
    pub fn hz(&self) -> f64 {
        1_000_000_000.0 / self.interval_nanos.load(Ordering::Acquire) as f64
    }

    /// Time between ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.load(Ordering::Acquire))
    }
}

impl Default for DrainRate {
    fn default() -> Self {
        Self {
            interval_nanos: AtomicU64::new((1_000_000_000.0 / DEFAULT_DRAIN_HZ) as u64),
        }
    }
}

/// Tick scheduler for hosts that own their frame loop.
///
/// Call [`poll`](Self::poll) once per frame; it returns `true` when a drain
/// tick is due. Missed ticks are not replayed: after a long frame the next
/// tick is scheduled one interval after the late one.
#[derive(Debug, Clone)]
pub struct DrainPacer {
    next_due: Option<Instant>,
}

impl DrainPacer {
    pub fn new() -> Self {
        Self { next_due: None }
    }

    /// Whether a tick is due at `now`, given the current `interval`.
    ///
    /// The first poll schedules the first tick one interval out.
    pub fn poll(&mut self, now: Instant, interval: Duration) -> bool {
        match self.next_due {
            None => {
                self.next_due = Some(now + interval);
                false
            }
            Some(due) if now >= due => {
                self.next_due = Some(now + interval);
                true
            }
            Some(_) => false,
        }
    }

    /// Forget the schedule; the next poll starts a fresh interval.
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}

impl Default for DrainPacer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single drain tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// One callback was invoked for this handle.
    Delivered(super::WorkHandle),
    /// Nothing was ready in any category.
    Idle,
}

impl DrainOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn delivered(&self) -> Option<super::WorkHandle> {
        match self {
            Self::Delivered(handle) => Some(*handle),
            Self::Idle => None,
        }
    }
}
