//! Worker spawning seam.
//!
//! The dispatcher hands each generator to a [`WorkSpawner`]. The default
//! spawner starts one named thread per job; [`ThreadPool`](super::ThreadPool)
//! bounds the thread count instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use super::error::DispatchError;
use super::handle::WorkHandle;

/// A generator run packaged for a worker thread.
pub struct Job {
    pub handle: WorkHandle,
    pub run: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    pub fn new(handle: WorkHandle, run: impl FnOnce() + Send + 'static) -> Self {
        Self { handle, run: Box::new(run) }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("handle", &self.handle).finish()
    }
}

/// Puts jobs on threads.
pub trait WorkSpawner: Send + Sync {
    /// Start `job` off the calling thread.
    fn spawn(&self, job: Job) -> Result<(), DispatchError>;

    /// Stop accepting jobs. Jobs already started run to completion.
    fn shutdown(&self) {}

    /// Short strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Spawns a dedicated OS thread for every job.
///
/// No pooling and no cap on thread count: a generator that never returns
/// holds its thread for the life of the process.
pub struct ThreadPerRequest {
    thread_name_prefix: String,
    stack_size: usize,
    spawned: AtomicU64,
}

impl ThreadPerRequest {
    pub fn new(thread_name_prefix: String, stack_size: usize) -> Self {
        Self {
            thread_name_prefix,
            stack_size,
            spawned: AtomicU64::new(0),
        }
    }

    /// Number of threads started so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl WorkSpawner for ThreadPerRequest {
    fn spawn(&self, job: Job) -> Result<(), DispatchError> {
        let mut builder = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name_prefix, job.handle.id()));
        if self.stack_size > 0 {
            builder = builder.stack_size(self.stack_size);
        }

        builder
            .spawn(job.run)
            .map_err(|e| DispatchError::SpawnFailed(e.to_string()))?;
        self.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "thread-per-request"
    }
}
