//! Worker configuration for generator execution.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::thread_pool::{ThreadPool, ThreadPoolConfig};
use super::worker::{ThreadPerRequest, WorkSpawner};

/// How generators are put on threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStrategy {
    /// One dedicated OS thread per submission. Unbounded thread creation.
    #[default]
    ThreadPerRequest,
    /// Fixed number of threads fed by a priority-ordered queue.
    Pooled,
}

/// Worker configuration for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub strategy: WorkerStrategy,
    /// Pool size. Ignored for thread-per-request.
    pub threads: NonZeroUsize,
    /// Stack size per thread in bytes.
    pub stack_size: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
    /// Pending job limit for the pool. Ignored for thread-per-request.
    pub queue_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            strategy: WorkerStrategy::ThreadPerRequest,
            threads: default_threads(),
            stack_size: 2 * 1024 * 1024, // 2MB
            thread_name_prefix: "dispatch-worker".to_string(),
            queue_size: 1024,
        }
    }
}

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

impl WorkerConfig {
    /// Bounded pool with a specific thread count (minimum 1).
    pub fn pooled(count: usize) -> Self {
        Self {
            strategy: WorkerStrategy::Pooled,
            threads: NonZeroUsize::new(count).unwrap_or(NonZeroUsize::MIN),
            ..Default::default()
        }
    }

    /// Build the spawner described by this config.
    pub fn build(&self) -> Box<dyn WorkSpawner> {
        match self.strategy {
            WorkerStrategy::ThreadPerRequest => Box::new(ThreadPerRequest::new(
                self.thread_name_prefix.clone(),
                self.stack_size,
            )),
            WorkerStrategy::Pooled => Box::new(ThreadPool::new(ThreadPoolConfig {
                num_threads: self.threads.get(),
                queue_size: self.queue_size,
                stack_size: self.stack_size,
                thread_name_prefix: self.thread_name_prefix.clone(),
            })),
        }
    }
}
