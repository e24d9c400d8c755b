//! Dispatch Core
//!
//! Runs expensive generators on background workers and hands their results
//! back to a single owning thread at a controlled pace.
//!
//! # Model
//!
//! - **Submit** from any thread: the generator starts on a worker and a
//!   [`WorkHandle`] comes back immediately.
//! - **Queue**: each result lands in `registry[category][priority]`.
//! - **Drain**: the owning thread ticks the dispatcher; every tick delivers at
//!   most one result, categories in declared order, highest priority first,
//!   FIFO within a queue.
//! - **Cancel**: a handle, or a whole category, can be withdrawn at any time
//!   before delivery. A cancelled callback never runs.
//!
//! ```no_run
//! use dispatch_core::{Category, Dispatcher, DispatcherConfig, Priority, SubmitOptions};
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::default())?;
//! let handle = dispatcher.submit_with(
//!     || (0..64u32).map(|x| x * x).sum::<u32>(),
//!     |outcome| println!("chunk mesh ready: {outcome:?}"),
//!     SubmitOptions::new()
//!         .category(Category::Terrain)
//!         .priority(Priority::Medium),
//! )?;
//!
//! // Once per frame on the owning thread:
//! dispatcher.drain_tick();
//! # let _ = handle;
//! # Ok::<(), dispatch_core::DispatchError>(())
//! ```

pub mod cli;
pub mod config;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

pub use scheduler::{
    Category, DispatchError, Dispatcher, DispatcherConfig, DrainOutcome, DrainPacer, Priority,
    StatsSnapshot, SubmitOptions, WorkError, WorkHandle, WorkId, WorkOutcome, WorkState,
    WorkerConfig, WorkerStrategy,
};
pub use shutdown::{ShutdownResult, ShutdownState};
