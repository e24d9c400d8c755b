//! Demo subcommand: a simulated voxel workload.
//!
//! Submits a mix of terrain meshing and entity pathing jobs across all
//! priorities, cancels a slice of them, then drives the drain loop on the
//! calling thread until every surviving job has been delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::scheduler::{
    Category, DispatchError, Dispatcher, DispatcherConfig, DrainPacer, Priority, StatsSnapshot,
    SubmitOptions, WorkHandle,
};

/// Jobs submitted when no count is given.
pub const DEFAULT_DEMO_COUNT: usize = 24;

/// Every Nth submission is cancelled right away.
const CANCEL_EVERY: usize = 7;

/// Summary printed at the end of a demo run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub requested: usize,
    pub cancelled: usize,
    pub callbacks: u64,
    /// Sum of all delivered payloads; stable for a given count.
    pub checksum: u64,
    pub elapsed_ms: u64,
    pub stats: StatsSnapshot,
}

/// Deterministic stand-in for meshing a 16x16 chunk column.
fn mesh_chunk(seed: u64) -> u64 {
    (0..256u64).fold(seed, |acc, i| acc.wrapping_mul(31).wrapping_add(i ^ seed) % 1_000_003)
}

/// Deterministic stand-in for a short path search.
fn find_path(seed: u64) -> u64 {
    (1..=seed % 32 + 1).map(|step| step * step).sum()
}

fn route(index: usize) -> SubmitOptions {
    let category = Category::ALL[index % Category::COUNT];
    let priority = Priority::ALL[(index / Category::COUNT) % Priority::COUNT];
    SubmitOptions::new().category(category).priority(priority)
}

/// Run `count` jobs through a fresh dispatcher built from `config`.
///
/// Gives up waiting after `config.shutdown_timeout`.
pub fn run_demo(config: DispatcherConfig, count: usize) -> Result<DemoReport, DispatchError> {
    let wait_limit = config.shutdown_timeout;
    let dispatcher = Dispatcher::new(config)?;
    let callbacks = Arc::new(AtomicU64::new(0));
    let checksum = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut handles: Vec<WorkHandle> = Vec::with_capacity(count);
    for index in 0..count {
        let options = route(index);
        let seed = index as u64;
        let callbacks = Arc::clone(&callbacks);
        let checksum = Arc::clone(&checksum);

        let handle = dispatcher.submit_with(
            move || match options.category {
                Category::Terrain => mesh_chunk(seed),
                _ => find_path(seed),
            },
            move |outcome| {
                callbacks.fetch_add(1, Ordering::Relaxed);
                if let Ok(value) = outcome {
                    checksum.fetch_add(value, Ordering::Relaxed);
                }
            },
            options,
        )?;
        handles.push(handle);
    }

    let mut cancelled = 0;
    for handle in handles.iter().step_by(CANCEL_EVERY) {
        if dispatcher.cancel(handle) {
            cancelled += 1;
        }
    }
    info!(count, cancelled, "demo workload submitted");

    let mut pacer = DrainPacer::new();
    // A limit past the end of time means wait until everything is delivered.
    let deadline = Instant::now().checked_add(wait_limit);
    while dispatcher.pending_count() > 0 && deadline.map_or(true, |d| Instant::now() < d) {
        if dispatcher.pump(&mut pacer, Instant::now()).is_none() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    dispatcher.shutdown();

    Ok(DemoReport {
        requested: count,
        cancelled,
        callbacks: callbacks.load(Ordering::Relaxed),
        checksum: checksum.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis() as u64,
        stats: dispatcher.stats(),
    })
}
