//! Bounded FIFO used by the batcher
//!
//! Overflow always evicts the oldest entries on push. A failed batch put back
//! with [`RingBuffer::requeue_front`] keeps its original order, and any excess
//! is trimmed from the newest end.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append one item. Returns how many of the oldest items were evicted.
    pub fn push_back(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Remove up to `n` items from the front
    pub fn take_front(&mut self, n: usize) -> Vec<T> {
        let n = n.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Put a batch back at the front, then trim the back to capacity.
    /// Returns the number of items dropped by the trim.
    pub fn requeue_front(&mut self, batch: Vec<T>) -> usize {
        for item in batch.into_iter().rev() {
            self.items.push_front(item);
        }
        let dropped = self.items.len().saturating_sub(self.capacity);
        self.items.truncate(self.capacity);
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
