//! Work prioritization within a category.

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::queue::FifoQueue;

/// Urgency of a submission within its category.
///
/// Declared from most to least urgent; that order is the drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    /// All levels in drain order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Number of priority levels.
    pub const COUNT: usize = Self::ALL.len();

    /// Slot index inside a [`PriorityQueueSet`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::High
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// One FIFO slot per priority level, each behind its own lock.
///
/// Slots are created once with the set and never resized. Locking per slot
/// lets submitters at different priorities proceed in parallel.
pub struct PriorityQueueSet<T> {
    slots: [Mutex<FifoQueue<T>>; Priority::COUNT],
}

impl<T> PriorityQueueSet<T> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(FifoQueue::new())),
        }
    }

    /// Append to the slot for `priority`.
    pub fn push(&self, priority: Priority, item: T) {
        self.slots[priority.index()].lock().enqueue(item);
    }

    /// Run `f` against a single slot while holding its lock.
    pub fn with_slot<R>(&self, priority: Priority, f: impl FnOnce(&mut FifoQueue<T>) -> R) -> R {
        let mut slot = self.slots[priority.index()].lock();
        f(&mut slot)
    }

    /// True if any slot holds an item.
    pub fn has_ready(&self) -> bool {
        self.slots.iter().any(|slot| !slot.lock().is_empty())
    }

    /// Take one item from the highest-priority non-empty slot.
    pub fn take_highest_ready(&self) -> Option<T> {
        self.take_highest_ready_with(|_| {})
    }

    /// Like [`take_highest_ready`](Self::take_highest_ready), calling `on_take`
    /// with the item before the slot lock is released.
    pub fn take_highest_ready_with(&self, mut on_take: impl FnMut(&T)) -> Option<T> {
        for slot in &self.slots {
            let mut queue = slot.lock();
            if let Some(item) = queue.dequeue() {
                on_take(&item);
                return Some(item);
            }
        }
        None
    }

    /// Total items across all slots.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_ready()
    }

    /// Empty every slot, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| {
                let mut queue = slot.lock();
                let dropped = queue.len();
                queue.clear();
                dropped
            })
            .sum()
    }
}

impl<T> Default for PriorityQueueSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
