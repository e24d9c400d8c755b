//! Graceful shutdown coordination for the dispatcher.
//!
//! Provides a state machine for clean termination that waits for running
//! generators before the worker pool is stopped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Counter plus wakeup for in-flight tracking.
struct InFlightSignal {
    count: AtomicU32,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// Coordinates graceful shutdown across dispatcher components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    signal: Arc<InFlightSignal>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            signal: Arc::new(InFlightSignal {
                count: AtomicU32::new(0),
                lock: Mutex::new(()),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Get current shutdown state.
    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if accepting new work.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track an in-flight worker. Returns None if shutting down.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Hold the read lock so a concurrent `initiate` cannot slip between
        // the state check and the increment.
        let state = self.state.read();
        if *state != ShutdownState::Running {
            return None;
        }
        self.signal.count.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard { signal: Arc::clone(&self.signal) })
    }

    /// Current in-flight worker count.
    pub fn in_flight_count(&self) -> u32 {
        self.signal.count.load(Ordering::SeqCst)
    }

    /// Initiate shutdown: stop accepting, wait for in-flight workers.
    pub fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;

        let result = self.wait_for_drain(timeout);

        *self.state.write() = ShutdownState::Stopped;
        result
    }

    /// A timeout too large to represent as an `Instant` waits without limit.
    fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.signal.lock.lock();

        loop {
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    return ShutdownResult::Timeout { remaining: count };
                }
                Some(deadline) => {
                    self.signal.cvar.wait_until(&mut guard, deadline);
                }
                None => self.signal.cvar.wait(&mut guard),
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight worker tracking.
pub struct ShutdownGuard {
    signal: Arc<InFlightSignal>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _lock = self.signal.lock.lock();
        self.signal.count.fetch_sub(1, Ordering::SeqCst);
        self.signal.cvar.notify_all();
    }
}
