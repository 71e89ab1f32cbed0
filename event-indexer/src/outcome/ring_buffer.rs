//! Fixed-capacity buffer that evicts its oldest entry when full.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut buffer = RingBuffer::new(3);
        assert!(buffer.push(1).is_none());
        assert!(buffer.push(2).is_none());
        assert_eq!(buffer.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        for i in 1..=3 {
            buffer.push(i);
        }
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.push(5), Some(2));
        assert_eq!(buffer.snapshot(), vec![3, 4, 5]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push("a");
        assert_eq!(buffer.push("b"), Some("a"));
        assert_eq!(buffer.snapshot(), vec!["b"]);
    }
}
