//! Fixed-capacity FIFO that empties itself when full.
//!
//! Used as the RX and TX buffers between a transport's provider thread and
//! the protocol side. A full queue means the consumer fell behind; stale data
//! is worth less than fresh data, so everything queued is discarded and the
//! new item is kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use botlink_metrics::{metric_defs, metrics};

/// Bounded FIFO with drop-all-on-full semantics.
///
/// `enqueue` and `dequeue` are serialized internally, so one producer and one
/// consumer may share the queue behind an `Arc`.
#[derive(Debug)]
pub struct BoundedOverwriteQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    overflows: AtomicU64,
    label: &'static str,
}

impl<T> BoundedOverwriteQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_label(capacity, "unnamed")
    }

    /// Create a queue whose overflows are reported under `label` (e.g. "rx").
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_label(capacity: usize, label: &'static str) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        BoundedOverwriteQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overflows: AtomicU64::new(0),
            label,
        }
    }

    /// Append an item, clearing the queue first if it is full.
    ///
    /// Returns true if queued items were discarded.
    pub fn enqueue(&self, item: T) -> bool {
        let mut items = self.items.lock();
        let overflowed = items.len() >= self.capacity;
        if overflowed {
            log::debug!("{} queue full, discarding {} items", self.label, items.len());
            items.clear();
            self.overflows.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(metric_defs::QUEUE_OVERFLOWS.name, "queue" => self.label).increment(1);
        }
        items.push_back(item);
        self.record_depth(items.len());
        overflowed
    }

    /// Remove the oldest item, if any.
    pub fn dequeue(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front();
        if item.is_some() {
            self.record_depth(items.len());
        }
        item
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Maximum number of items held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard every queued item.
    ///
    /// Returns the number of items discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let discarded = items.len();
        items.clear();
        self.record_depth(0);
        discarded
    }

    /// Number of times the queue was cleared because it was full.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        self.label
    }

    fn record_depth(&self, depth: usize) {
        metrics::gauge!(metric_defs::QUEUE_DEPTH.name, "queue" => self.label).set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedOverwriteQueue::new(4);
        for i in 0..3 {
            assert!(!queue.enqueue(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some(0));
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_keeps_only_newest() {
        let queue = BoundedOverwriteQueue::new(16);
        for i in 0..16 {
            assert!(!queue.enqueue(i));
        }
        assert!(queue.enqueue(16));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue(), Some(16));
        assert_eq!(queue.overflows(), 1);
    }

    #[test]
    fn test_capacity_one() {
        let queue = BoundedOverwriteQueue::with_label(1, "tx");
        assert!(!queue.enqueue("a"));
        assert!(queue.enqueue("b"));
        assert_eq!(queue.dequeue(), Some("b"));
        assert_eq!(queue.label(), "tx");
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_clear() {
        let queue = BoundedOverwriteQueue::new(2);
        queue.enqueue(vec![1u8]);
        queue.enqueue(vec![2u8]);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.overflows(), 0);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_rejected() {
        let _ = BoundedOverwriteQueue::<u8>::new(0);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let queue = Arc::new(BoundedOverwriteQueue::new(1024));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..500u32 {
                    queue.enqueue(i);
                }
            })
        };
        producer.join().unwrap();

        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, (0..500).collect::<Vec<_>>());
    }
}
