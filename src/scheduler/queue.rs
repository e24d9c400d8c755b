//! FIFO queue with arbitrary-element removal.
//!
//! Ready results can be invalidated before they are delivered (a terrain chunk
//! unloads while its mesh is still queued), so the queue supports locating and
//! removing any element by equality, not just popping the head.

use std::collections::VecDeque;

/// Unbounded FIFO queue supporting membership tests and removal by value.
///
/// Not synchronized. Callers that share a queue across threads wrap it in a
/// lock, see [`PriorityQueueSet`](super::PriorityQueueSet).
#[derive(Debug, Clone)]
pub struct FifoQueue<T> {
    items: VecDeque<T>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Append an item at the tail. Never fails.
    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return the head, or `None` if the queue is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Borrow the head without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Linear scan for an element equal to `item`.
    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        T: PartialEq<Q>,
        Q: ?Sized,
    {
        self.items.iter().any(|t| t == item)
    }

    /// Remove the first element equal to `item`. Returns whether one was found.
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        T: PartialEq<Q>,
        Q: ?Sized,
    {
        match self.items.iter().position(|t| t == item) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
