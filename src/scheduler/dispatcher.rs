//! The dispatcher: off-thread generation, on-thread paced delivery.
//!
//! Submissions get a [`WorkHandle`] immediately. The generator runs on a
//! worker; its outcome is queued under `registry[category][priority]`. The
//! owning thread calls [`Dispatcher::drain_tick`] (directly or through one of
//! the drain loop drivers) and each tick delivers at most one outcome:
//! categories in declared order, highest priority first.
//!
//! Every state change of a handle happens while holding the lock of its
//! (category, priority) queue, so cancellation and delivery never race: a
//! handle is either cancelled and its callback never runs, or delivered and
//! `cancel` reports `false`.

use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::category::{Category, CategoryRegistry};
use super::drain::{DrainOutcome, DrainPacer, DrainRate, DEFAULT_DRAIN_HZ};
use super::error::{DispatchError, WorkError, WorkOutcome};
use super::handle::{
    panic_message, Callback, CallbackSlot, Expire, InFlight, ReadyKind, ReadyWork, WorkHandle,
    WorkId, WorkState,
};
use super::pool::WorkerConfig;
use super::priority::Priority;
use super::worker::{Job, WorkSpawner};
use crate::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use crate::telemetry::{metrics, SpanExt, WorkSpan};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Drain ticks per second.
    pub drain_hz: f64,
    /// Timeout applied to submissions that do not set their own.
    pub default_timeout: Option<Duration>,
    pub workers: WorkerConfig,
    /// How long `shutdown` waits for running generators.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            drain_hz: DEFAULT_DRAIN_HZ,
            default_timeout: None,
            workers: WorkerConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-submission routing and deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    pub category: Category,
    pub priority: Priority,
    /// Overrides the dispatcher's default timeout when set.
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    /// Callbacks invoked, successful or not.
    pub delivered: u64,
    /// Deliveries carrying a generator failure or panic.
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    /// Worker results dropped because the handle was no longer pending.
    pub discarded: u64,
    /// Submissions not yet delivered or cancelled.
    pub pending: usize,
    /// Outcomes queued and waiting for a tick.
    pub ready: usize,
}

#[derive(Default)]
struct DispatchStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    discarded: AtomicU64,
}

/// Ids are unique across dispatchers so a foreign handle never matches.
static NEXT_WORK_ID: AtomicU64 = AtomicU64::new(1);

/// State reachable from worker threads.
struct Shared {
    registry: CategoryRegistry<ReadyWork>,
    in_flight: DashMap<WorkId, InFlight>,
    stats: DispatchStats,
}

impl Shared {
    /// Queue an outcome if its handle is still running. Returns false when
    /// the handle was cancelled or already expired.
    fn complete(
        &self,
        handle: WorkHandle,
        kind: ReadyKind,
        deliver: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.registry
            .with_queue(handle.category(), handle.priority(), |queue| {
                match self.in_flight.get_mut(&handle.id()) {
                    Some(mut entry) if entry.state == WorkState::Running => {
                        entry.state = WorkState::Ready;
                        drop(entry);
                        queue.enqueue(ReadyWork::new(handle, kind, deliver));
                        true
                    }
                    _ => false,
                }
            })
    }

    /// Worker body: run the generator, capture failures, queue the outcome.
    fn run_generator<T, E, G>(&self, handle: WorkHandle, generate: G, slot: Arc<CallbackSlot<T>>)
    where
        T: Send + 'static,
        E: fmt::Display,
        G: FnOnce() -> Result<T, E>,
    {
        let span = WorkSpan::new(&handle);
        let _enter = span.enter();
        let started = Instant::now();

        let outcome: WorkOutcome<T> = match panic::catch_unwind(AssertUnwindSafe(generate)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WorkError::GeneratorFailed(e.to_string())),
            Err(payload) => Err(WorkError::GeneratorPanicked(panic_message(&*payload))),
        };
        span.record_outcome(&outcome, started.elapsed().as_millis() as u64);

        let kind = match &outcome {
            Ok(_) => ReadyKind::Completed,
            Err(e) => {
                warn!(work_id = %handle.id(), error = %e, "generator failed");
                ReadyKind::Failed
            }
        };

        if !self.complete(handle, kind, move || slot.complete(outcome)) {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::record_discarded(handle.category());
            debug!(work_id = %handle.id(), "result discarded, handle no longer pending");
        }
    }
}

/// Background work dispatcher with paced main-thread delivery.
///
/// Share it with `Arc` when several threads submit. Callbacks run on
/// whichever thread drives the drain ticks.
pub struct Dispatcher {
    shared: Arc<Shared>,
    spawner: Box<dyn WorkSpawner>,
    drain_rate: DrainRate,
    default_timeout: Option<Duration>,
    shutdown: ShutdownCoordinator,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the worker strategy named in `config`.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let spawner = config.workers.build();
        Self::with_spawner(config, spawner)
    }

    /// Create a dispatcher around a caller-supplied spawner.
    pub fn with_spawner(
        config: DispatcherConfig,
        spawner: Box<dyn WorkSpawner>,
    ) -> Result<Self, DispatchError> {
        let drain_rate = DrainRate::new(config.drain_hz)?;

        let registry = CategoryRegistry::new();
        registry.setup();

        info!(
            workers = spawner.name(),
            drain_hz = drain_rate.hz(),
            "dispatcher created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                in_flight: DashMap::new(),
                stats: DispatchStats::default(),
            }),
            spawner,
            drain_rate,
            default_timeout: config.default_timeout,
            shutdown: ShutdownCoordinator::new(),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Submit with default routing (`Category::Default`, `Priority::High`).
    pub fn submit<T, G, C>(&self, generate: G, on_complete: C) -> Result<WorkHandle, DispatchError>
    where
        T: Send + 'static,
        G: FnOnce() -> T + Send + 'static,
        C: FnOnce(WorkOutcome<T>) + Send + 'static,
    {
        self.submit_with(generate, on_complete, SubmitOptions::default())
    }

    /// Submit an infallible generator with explicit routing.
    pub fn submit_with<T, G, C>(
        &self,
        generate: G,
        on_complete: C,
        options: SubmitOptions,
    ) -> Result<WorkHandle, DispatchError>
    where
        T: Send + 'static,
        G: FnOnce() -> T + Send + 'static,
        C: FnOnce(WorkOutcome<T>) + Send + 'static,
    {
        self.try_submit_with(move || Ok::<T, Infallible>(generate()), on_complete, options)
    }

    /// Submit a fallible generator. An `Err` is delivered to `on_complete`
    /// as [`WorkError::GeneratorFailed`].
    pub fn try_submit_with<T, E, G, C>(
        &self,
        generate: G,
        on_complete: C,
        options: SubmitOptions,
    ) -> Result<WorkHandle, DispatchError>
    where
        T: Send + 'static,
        E: fmt::Display,
        G: FnOnce() -> Result<T, E> + Send + 'static,
        C: FnOnce(WorkOutcome<T>) + Send + 'static,
    {
        let guard = self.shutdown.track().ok_or(DispatchError::ShuttingDown)?;

        let id = WorkId(NEXT_WORK_ID.fetch_add(1, Ordering::Relaxed));
        let handle = WorkHandle::new(id, options.category, options.priority);
        let slot = Arc::new(CallbackSlot::new(Box::new(on_complete) as Callback<T>));

        let submitted_at = Instant::now();
        let deadline = options
            .timeout
            .or(self.default_timeout)
            .and_then(|timeout| submitted_at.checked_add(timeout));
        let expire: Arc<dyn Expire> = slot.clone();

        // Registered before spawning so a fast worker always finds its entry.
        self.shared.in_flight.insert(
            id,
            InFlight {
                handle,
                state: WorkState::Running,
                submitted_at,
                deadline,
                expire,
            },
        );

        let shared = Arc::clone(&self.shared);
        let job = Job::new(handle, move || {
            let _guard = guard;
            shared.run_generator(handle, generate, slot);
        });

        if let Err(e) = self.spawner.spawn(job) {
            self.shared.in_flight.remove(&id);
            warn!(work_id = %id, error = %e, "failed to start worker");
            return Err(e);
        }

        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_submitted(handle.category());
        metrics::record_pending(self.shared.in_flight.len());
        debug!(
            work_id = %id,
            category = %handle.category(),
            priority = %handle.priority(),
            "work submitted"
        );
        Ok(handle)
    }

    /// Deliver at most one ready outcome.
    ///
    /// Overdue submissions are expired first, so a timed-out request
    /// competes for this tick under the normal ordering rules.
    pub fn drain_tick(&self) -> DrainOutcome {
        self.expire_overdue(Instant::now());

        let mut submitted_at = None;
        let next = self.shared.registry.take_next_with(|item| {
            submitted_at = self
                .shared
                .in_flight
                .remove(&item.handle.id())
                .map(|(_, entry)| entry.submitted_at);
        });

        let Some(item) = next else {
            return DrainOutcome::Idle;
        };

        let handle = item.handle;
        let kind = item.kind;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(item.deliver)) {
            error!(
                work_id = %handle.id(),
                panic = %panic_message(&*payload),
                "completion callback panicked"
            );
        }

        let stats = &self.shared.stats;
        stats.delivered.fetch_add(1, Ordering::Relaxed);
        if kind == ReadyKind::Failed {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            metrics::record_failed(handle.category());
        }
        let latency_ms = submitted_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or_default();
        metrics::record_delivered(handle.category(), latency_ms);
        metrics::record_pending(self.shared.in_flight.len());
        debug!(work_id = %handle.id(), kind = ?kind, "work delivered");

        DrainOutcome::Delivered(handle)
    }

    /// Turn overdue running submissions into queued `TimedOut` failures.
    fn expire_overdue(&self, now: Instant) {
        // Collect first: the map must not be borrowed while a queue lock is taken.
        let overdue: Vec<(WorkHandle, u64, Arc<dyn Expire>)> = self
            .shared
            .in_flight
            .iter()
            .filter(|entry| entry.is_overdue(now))
            .map(|entry| {
                let after = entry
                    .deadline
                    .map(|d| d.saturating_duration_since(entry.submitted_at))
                    .unwrap_or_default();
                (entry.handle, after.as_millis() as u64, Arc::clone(&entry.expire))
            })
            .collect();

        for (handle, after_ms, expire) in overdue {
            let expired = self.shared.registry.with_queue(
                handle.category(),
                handle.priority(),
                |queue| match self.shared.in_flight.get_mut(&handle.id()) {
                    Some(mut entry) if entry.is_overdue(now) => {
                        entry.state = WorkState::Ready;
                        drop(entry);
                        queue.enqueue(ReadyWork::new(handle, ReadyKind::TimedOut, move || {
                            expire.fail(WorkError::TimedOut { after_ms })
                        }));
                        true
                    }
                    _ => false,
                },
            );

            if expired {
                self.shared.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                metrics::record_timed_out(handle.category());
                warn!(work_id = %handle.id(), after_ms, "work timed out");
            }
        }
    }

    /// Cancel a pending submission in any category.
    ///
    /// Returns false if the handle was already delivered, cancelled, or is
    /// unknown. A running generator is not interrupted; its result is
    /// discarded when it finishes.
    pub fn cancel(&self, handle: &WorkHandle) -> bool {
        let cancelled = self
            .shared
            .registry
            .with_queue(handle.category(), handle.priority(), |queue| {
                match self.shared.in_flight.remove(&handle.id()) {
                    Some(_) => {
                        queue.remove(handle);
                        true
                    }
                    None => false,
                }
            });

        if cancelled {
            self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            metrics::record_cancelled(handle.category(), 1);
            metrics::record_pending(self.shared.in_flight.len());
            debug!(work_id = %handle.id(), "work cancelled");
        }
        cancelled
    }

    /// Cancel every unfinished submission in `category`, ready or running.
    /// Returns the number cancelled. Other categories are untouched.
    pub fn clear_category(&self, category: Category) -> usize {
        let mut cleared = 0;
        for priority in Priority::ALL {
            cleared += self.shared.registry.with_queue(category, priority, |queue| {
                queue.clear();
                let mut removed = 0;
                self.shared.in_flight.retain(|_, entry| {
                    let hit = entry.handle.category() == category
                        && entry.handle.priority() == priority;
                    if hit {
                        removed += 1;
                    }
                    !hit
                });
                removed
            });
        }

        if cleared > 0 {
            self.shared
                .stats
                .cancelled
                .fetch_add(cleared as u64, Ordering::Relaxed);
            metrics::record_cancelled(category, cleared as u64);
            metrics::record_pending(self.shared.in_flight.len());
        }
        info!(category = %category, cleared, "category cleared");
        cleared
    }

    /// True while the handle is running or ready, i.e. not yet delivered
    /// or cancelled.
    pub fn still_pending(&self, handle: &WorkHandle) -> bool {
        self.shared.in_flight.contains_key(&handle.id())
    }

    /// True if the outcome is queued and waiting for a tick.
    pub fn is_ready(&self, handle: &WorkHandle) -> bool {
        self.shared
            .registry
            .contains_in_category(handle.category(), handle)
    }

    /// Current state, or `None` once delivered, cancelled, or unknown.
    pub fn state(&self, handle: &WorkHandle) -> Option<WorkState> {
        self.shared
            .in_flight
            .get(&handle.id())
            .map(|entry| entry.state)
    }

    /// Submissions not yet delivered or cancelled.
    pub fn pending_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Outcomes queued across all categories.
    pub fn ready_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Change the drain cadence; applies from the next scheduled tick.
    pub fn set_drain_rate(&self, hz: f64) -> Result<(), DispatchError> {
        self.drain_rate.set_hz(hz)?;
        info!(drain_hz = self.drain_rate.hz(), "drain rate changed");
        Ok(())
    }

    /// Current drain cadence in ticks per second.
    pub fn drain_rate(&self) -> f64 {
        self.drain_rate.hz()
    }

    /// Time between drain ticks.
    pub fn drain_interval(&self) -> Duration {
        self.drain_rate.interval()
    }

    /// Tick if `pacer` says one is due at `now`. Returns `None` when not due.
    pub fn pump(&self, pacer: &mut DrainPacer, now: Instant) -> Option<DrainOutcome> {
        if pacer.poll(now, self.drain_rate.interval()) {
            Some(self.drain_tick())
        } else {
            None
        }
    }

    /// Drive drain ticks on the calling thread until `stop` is set or the
    /// dispatcher is stopped. Returns the number of deliveries.
    pub fn run_drain_loop(&self, stop: &AtomicBool) -> u64 {
        info!(drain_hz = self.drain_rate.hz(), "drain loop started");
        let mut delivered = 0;

        while !stop.load(Ordering::Acquire) && self.shutdown.state() != ShutdownState::Stopped {
            thread::sleep(self.drain_rate.interval());
            if !self.drain_tick().is_idle() {
                delivered += 1;
            }
        }

        info!(delivered, "drain loop stopped");
        delivered
    }

    /// Async drain loop. Run it on a current-thread runtime to keep callbacks
    /// on one thread. Returns the number of deliveries.
    pub async fn run_drain_loop_async(&self, token: CancellationToken) -> u64 {
        info!(drain_hz = self.drain_rate.hz(), "async drain loop started");
        let mut delivered = 0;

        while self.shutdown.state() != ShutdownState::Stopped {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.drain_rate.interval()) => {}
            }
            if !self.drain_tick().is_idle() {
                delivered += 1;
            }
        }

        info!(delivered, "async drain loop stopped");
        delivered
    }

    /// Whether new submissions are accepted.
    pub fn is_accepting(&self) -> bool {
        self.shutdown.is_accepting()
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> ShutdownState {
        self.shutdown.state()
    }

    /// Generators currently executing or waiting for a pool thread.
    pub fn running_workers(&self) -> u32 {
        self.shutdown.in_flight_count()
    }

    /// Shut down using the configured timeout.
    pub fn shutdown(&self) -> ShutdownResult {
        self.shutdown_with_timeout(self.shutdown_timeout)
    }

    /// Stop accepting work, wait up to `timeout` for running generators,
    /// then stop the workers. Ready outcomes stay drainable.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> ShutdownResult {
        info!(timeout_ms = timeout.as_millis() as u64, "dispatcher shutting down");
        let result = self.shutdown.initiate(timeout);
        self.spawner.shutdown();

        match &result {
            ShutdownResult::Complete => info!("dispatcher stopped"),
            ShutdownResult::Timeout { remaining } => {
                warn!(remaining, "dispatcher stopped with generators still running")
            }
        }
        result
    }

    /// Snapshot of dispatcher counters.
    pub fn stats(&self) -> StatsSnapshot {
        let stats = &self.shared.stats;
        StatsSnapshot {
            submitted: stats.submitted.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            timed_out: stats.timed_out.load(Ordering::Relaxed),
            cancelled: stats.cancelled.load(Ordering::Relaxed),
            discarded: stats.discarded.load(Ordering::Relaxed),
            pending: self.shared.in_flight.len(),
            ready: self.shared.registry.len(),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.spawner.name())
            .field("drain_hz", &self.drain_rate.hz())
            .field("pending", &self.pending_count())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
