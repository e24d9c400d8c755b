//! Bounded thread pool for generator execution.
//!
//! A fixed set of named threads share one injector queue. Jobs are kept in
//! priority order, FIFO within a priority, so urgent work starts first when
//! every thread is busy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error};

use super::error::DispatchError;
use super::priority::Priority;
use super::worker::{Job, WorkSpawner};

/// Configuration for the thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = auto-detect).
    pub num_threads: usize,
    /// Maximum queued jobs awaiting a thread.
    pub queue_size: usize,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0, // Auto-detect
            queue_size: 1024,
            stack_size: 0,
            thread_name_prefix: "dispatch-pool".to_string(),
        }
    }
}

/// Job wrapper carrying its ordering key.
struct PrioritizedJob {
    job: Job,
    priority: Priority,
    sequence: u64, // FIFO within same priority
}

/// Statistics for thread pool performance.
#[derive(Debug, Default, Clone)]
pub struct ThreadPoolStats {
    pub total_jobs_executed: u64,
    pub queue_overflows: u64,
    pub avg_exec_time_us: u64,
    pub threads_active: usize,
    pub threads_idle: usize,
}

/// State shared between the pool handle and its threads.
struct PoolShared {
    queue: Mutex<VecDeque<PrioritizedJob>>,
    available: Condvar,
    shutdown: AtomicBool,
    active: AtomicUsize,
    stats: RwLock<ThreadPoolStats>,
}

/// Fixed-size pool with a priority-ordered injector queue.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    config: ThreadPoolConfig,
    num_threads: usize,
    sequence: AtomicU64,
}

impl ThreadPool {
    /// Create a new thread pool with the given configuration.
    ///
    /// Threads that fail to start are logged and skipped; if none start,
    /// every later `spawn` is rejected.
    pub fn new(config: ThreadPoolConfig) -> Self {
        let num_threads = if config.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_threads
        };

        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::with_capacity(config.queue_size)),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            stats: RwLock::new(ThreadPoolStats::default()),
        });

        let mut handles = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }

            let shared_clone = Arc::clone(&shared);
            match builder.spawn(move || Self::worker_loop(shared_clone)) {
                Ok(handle) => handles.push(handle),
                Err(e) => error!(worker = id, error = %e, "failed to start pool thread"),
            }
        }

        if handles.is_empty() {
            shared.shutdown.store(true, Ordering::SeqCst);
        }
        let num_threads = handles.len();

        Self {
            shared,
            handles: Mutex::new(handles),
            config,
            num_threads,
            sequence: AtomicU64::new(0),
        }
    }

    /// Queue a job behind higher-priority and earlier same-priority jobs.
    fn enqueue(&self, job: Job) -> Result<(), DispatchError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(DispatchError::PoolShutdown);
        }

        let prioritized = PrioritizedJob {
            priority: job.handle.priority(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            job,
        };

        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.config.queue_size {
                self.shared.stats.write().queue_overflows += 1;
                return Err(DispatchError::QueueFull);
            }

            // Priority::High sorts first; equal priorities keep arrival order.
            let insert_pos = queue
                .iter()
                .position(|queued| {
                    queued.priority > prioritized.priority
                        || (queued.priority == prioritized.priority
                            && queued.sequence > prioritized.sequence)
                })
                .unwrap_or(queue.len());
            queue.insert(insert_pos, prioritized);
        }

        self.shared.available.notify_one();
        Ok(())
    }

    /// Worker thread main loop.
    fn worker_loop(shared: Arc<PoolShared>) {
        loop {
            let next = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(job) = queue.pop_front() {
                        break Some(job);
                    }
                    if shared.shutdown.load(Ordering::SeqCst) {
                        break None;
                    }
                    shared.available.wait(&mut queue);
                }
            };

            let Some(prioritized) = next else {
                return;
            };

            shared.active.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();
            (prioritized.job.run)();
            let exec_us = start.elapsed().as_micros() as u64;
            shared.active.fetch_sub(1, Ordering::SeqCst);

            let mut stats = shared.stats.write();
            stats.total_jobs_executed += 1;
            // Rolling average of execution time
            if stats.avg_exec_time_us == 0 {
                stats.avg_exec_time_us = exec_us;
            } else {
                stats.avg_exec_time_us = (stats.avg_exec_time_us * 9 + exec_us) / 10;
            }
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let mut stats = self.shared.stats.read().clone();
        stats.threads_active = self.shared.active.load(Ordering::SeqCst);
        stats.threads_idle = self.num_threads.saturating_sub(stats.threads_active);
        stats
    }

    /// Get number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Jobs waiting for a thread.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Check if pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Signal shutdown (does not wait for threads). Queued jobs still run.
    pub fn signal_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _queue = self.shared.queue.lock();
        self.shared.available.notify_all();
    }

    /// Signal shutdown and wait for every thread to exit.
    pub fn join(&self) {
        self.signal_shutdown();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                debug!("pool thread exited with a panic");
            }
        }
    }
}

impl WorkSpawner for ThreadPool {
    fn spawn(&self, job: Job) -> Result<(), DispatchError> {
        self.enqueue(job)
    }

    fn shutdown(&self) {
        self.signal_shutdown();
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join();
    }
}
