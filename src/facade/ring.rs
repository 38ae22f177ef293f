use std::collections::VecDeque;

/// Fixed-capacity FIFO. Pushing onto a full ring evicts the oldest element.
#[derive(Debug, Clone)]
pub struct LogRing<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> LogRing<T> {
    /// A capacity of zero is clamped to one.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
