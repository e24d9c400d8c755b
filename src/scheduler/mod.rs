//! Work scheduling for the dispatcher.
//!
//! Leaf-first: a removable FIFO queue, a per-priority queue set, a
//! per-category registry, worker spawning, drain pacing, and the dispatcher
//! that ties them together.

mod category;
mod dispatcher;
mod drain;
mod error;
mod handle;
mod pool;
mod priority;
mod queue;
mod thread_pool;
mod worker;


pub use category::{Category, CategoryRegistry};
pub use dispatcher::{Dispatcher, DispatcherConfig, StatsSnapshot, SubmitOptions};
pub use drain::{DrainOutcome, DrainPacer, DrainRate, DEFAULT_DRAIN_HZ, MAX_DRAIN_HZ};
pub use error::{DispatchError, WorkError, WorkOutcome};
pub use handle::{Callback, WorkHandle, WorkId, WorkState};
pub use pool::{WorkerConfig, WorkerStrategy};
pub use priority::{Priority, PriorityQueueSet};
pub use queue::FifoQueue;
pub use thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolStats};
pub use worker::{Job, ThreadPerRequest, WorkSpawner};
