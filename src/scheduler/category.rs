//! Work categories and the per-category queue registry.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::priority::{Priority, PriorityQueueSet};
use super::queue::FifoQueue;

/// Declared grouping of work. Categories are drained in declaration order
/// on every tick; the order never changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Terrain = 0,
    Entity = 1,
    Default = 2,
}

impl Category {
    /// All categories in drain order.
    pub const ALL: [Category; 3] = [Category::Terrain, Category::Entity, Category::Default];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terrain => "terrain",
            Self::Entity => "entity",
            Self::Default => "default",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Default
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terrain" => Ok(Self::Terrain),
            "entity" => Ok(Self::Entity),
            "default" => Ok(Self::Default),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Fixed mapping from [`Category`] to a [`PriorityQueueSet`].
///
/// Queues are created once, either by an explicit [`setup`](Self::setup) or
/// lazily by the first operation that needs them. Each (category, priority)
/// queue carries its own lock; there is no registry-wide lock.
pub struct CategoryRegistry<T> {
    sets: OnceLock<Vec<PriorityQueueSet<T>>>,
}

impl<T> CategoryRegistry<T> {
    pub fn new() -> Self {
        Self { sets: OnceLock::new() }
    }

    /// Create the per-category queues. Returns `false` if they already existed.
    pub fn setup(&self) -> bool {
        let mut created = false;
        self.sets.get_or_init(|| {
            created = true;
            Self::build()
        });
        created
    }

    pub fn is_setup(&self) -> bool {
        self.sets.get().is_some()
    }

    fn build() -> Vec<PriorityQueueSet<T>> {
        Category::ALL.iter().map(|_| PriorityQueueSet::new()).collect()
    }

    /// The priority set for `category`, initializing the registry if needed.
    pub fn category(&self, category: Category) -> &PriorityQueueSet<T> {
        &self.sets.get_or_init(Self::build)[category.index()]
    }

    /// Thread-safe append into `registry[category][priority]`.
    pub fn submit(&self, category: Category, priority: Priority, item: T) {
        self.category(category).push(priority, item);
    }

    /// Locked access to a single (category, priority) queue.
    pub fn with_queue<R>(
        &self,
        category: Category,
        priority: Priority,
        f: impl FnOnce(&mut FifoQueue<T>) -> R,
    ) -> R {
        self.category(category).with_slot(priority, f)
    }

    /// Empty every priority slot of `category`. Returns the number dropped.
    pub fn clear_category(&self, category: Category) -> usize {
        self.category(category).clear()
    }

    /// True if any slot of `category` holds an element equal to `item`.
    pub fn contains_in_category<Q>(&self, category: Category, item: &Q) -> bool
    where
        T: PartialEq<Q>,
        Q: ?Sized,
    {
        let set = self.category(category);
        Priority::ALL
            .iter()
            .any(|&p| set.with_slot(p, |q| q.contains(item)))
    }

    /// Remove the first element equal to `item` from any slot of `category`.
    pub fn remove_from_category<Q>(&self, category: Category, item: &Q) -> bool
    where
        T: PartialEq<Q>,
        Q: ?Sized,
    {
        let set = self.category(category);
        Priority::ALL
            .iter()
            .any(|&p| set.with_slot(p, |q| q.remove(item)))
    }

    /// First ready item in category order, highest priority first.
    pub fn take_next(&self) -> Option<T> {
        self.take_next_with(|_| {})
    }

    /// Like [`take_next`](Self::take_next), calling `on_take` while the
    /// owning slot is still locked.
    pub fn take_next_with(&self, mut on_take: impl FnMut(&T)) -> Option<T> {
        Category::ALL
            .iter()
            .find_map(|&c| self.category(c).take_highest_ready_with(&mut on_take))
    }

    /// Total items across all categories.
    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|&c| self.category(c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|&c| !self.category(c).has_ready())
    }
}

impl<T> Default for CategoryRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
