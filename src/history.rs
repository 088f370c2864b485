//! Fixed-capacity FIFO history.
//!
//! Backed by the same SPSC ring the streaming stages use for their sample FIFOs.
//! Both ends are held by one owner, so appends and evictions are plain O(1) ring
//! operations with no locking.

use ringbuf::{Consumer, Producer, RingBuffer};

/// Bounded history that evicts its oldest entry when full.
pub struct BoundedHistory<T> {
    producer: Producer<T>,
    consumer: Consumer<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (producer, consumer) = RingBuffer::<T>::new(capacity).split();
        Self {
            producer,
            consumer,
            capacity,
        }
    }

    /// Append `item`, returning the entry evicted to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.producer.is_full() {
            self.consumer.pop()
        } else {
            None
        };
        let _ = self.producer.push(item);
        evicted
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.push(item);
        }
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.consumer.iter()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.len().saturating_sub(n);
        self.consumer.iter().skip(skip)
    }

    pub fn latest(&self) -> Option<&T> {
        self.consumer.iter().last()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        while self.consumer.pop().is_some() {}
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BoundedHistory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedHistory")
            .field("capacity", &self.capacity)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let mut h = BoundedHistory::new(3);
        assert_eq!(h.push(1), None);
        assert_eq!(h.push(2), None);
        assert_eq!(h.push(3), None);
        assert_eq!(h.push(4), Some(1));
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_recent_and_latest() {
        let mut h = BoundedHistory::new(5);
        h.extend(1..=4);
        assert_eq!(h.recent(2).copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(h.recent(10).count(), 4);
        assert_eq!(h.latest(), Some(&4));
    }

    #[test]
    fn test_clear() {
        let mut h = BoundedHistory::new(2);
        h.extend(["a".to_string(), "b".to_string()]);
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.latest(), None);
        h.push("c".to_string());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let mut h = BoundedHistory::new(0);
        assert_eq!(h.capacity(), 1);
        h.push(7);
        assert_eq!(h.push(8), Some(7));
    }
}
