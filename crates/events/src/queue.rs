use std::collections::VecDeque;

/// FIFO of events awaiting dispatch.
///
/// Owned by the dispatch loop alone, so no locking.
#[derive(Debug, Clone)]
pub struct EventQueue<T> {
    items: VecDeque<T>,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Append in iteration order.
    pub fn enqueue_all(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
