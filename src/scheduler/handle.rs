//! Work handles and the type-erased pieces that travel through the queues.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::error::{WorkError, WorkOutcome};
use super::priority::Priority;

/// Unique identifier assigned at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkId(pub u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one submitted unit of work.
///
/// Handles are immutable and returned before the worker starts. Equality
/// and hashing use only the id; category and priority say where the result
/// will be queued.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkHandle {
    id: WorkId,
    category: Category,
    priority: Priority,
}

impl WorkHandle {
    pub(crate) fn new(id: WorkId, category: Category, priority: Priority) -> Self {
        Self { id, category, priority }
    }

    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl PartialEq for WorkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkHandle {}

impl Hash for WorkHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Lifecycle of a submission that has not reached a terminal state.
///
/// Delivered and cancelled handles are forgotten entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Generator has not finished yet.
    Running,
    /// Outcome is queued and waiting for a drain tick.
    Ready,
}

/// Kind of outcome carried by a ready item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadyKind {
    Completed,
    Failed,
    TimedOut,
}

/// Completion callback supplied by the caller.
pub type Callback<T> = Box<dyn FnOnce(WorkOutcome<T>) + Send + 'static>;

/// Holds a callback until exactly one outcome claims it.
///
/// Shared between the worker (normal completion) and the in-flight table
/// (timeout expiry). Whichever path takes the callback first wins.
pub(crate) struct CallbackSlot<T> {
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> CallbackSlot<T> {
    pub(crate) fn new(callback: Callback<T>) -> Self {
        Self { callback: Mutex::new(Some(callback)) }
    }

    /// Invoke the callback with `outcome`. Later calls are no-ops.
    pub(crate) fn complete(&self, outcome: WorkOutcome<T>) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

/// Type-erased failure path for a pending submission.
pub(crate) trait Expire: Send + Sync {
    fn fail(&self, error: WorkError);
}

impl<T: Send> Expire for CallbackSlot<T> {
    fn fail(&self, error: WorkError) {
        self.complete(Err(error));
    }
}

/// A finished outcome waiting in a (category, priority) queue.
pub(crate) struct ReadyWork {
    pub(crate) handle: WorkHandle,
    pub(crate) kind: ReadyKind,
    pub(crate) deliver: Box<dyn FnOnce() + Send + 'static>,
}

impl ReadyWork {
    pub(crate) fn new(
        handle: WorkHandle,
        kind: ReadyKind,
        deliver: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { handle, kind, deliver: Box::new(deliver) }
    }
}

impl fmt::Debug for ReadyWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyWork")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq<WorkHandle> for ReadyWork {
    fn eq(&self, other: &WorkHandle) -> bool {
        self.handle == *other
    }
}

/// Bookkeeping for a submission that has not been delivered or cancelled.
pub(crate) struct InFlight {
    pub(crate) handle: WorkHandle,
    pub(crate) state: WorkState,
    pub(crate) submitted_at: Instant,
    pub(crate) deadline: Option<Instant>,
    pub(crate) expire: std::sync::Arc<dyn Expire>,
}

impl InFlight {
    pub(crate) fn is_overdue(&self, now: Instant) -> bool {
        self.state == WorkState::Running && self.deadline.map_or(false, |d| now >= d)
    }
}

/// Best-effort message extraction from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
