//! Circular buffer: a fixed-capacity FIFO ring with drop-oldest overflow
//! semantics and an optional drop callback.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Snapshot of a [`CircularBuffer`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
    pub dropped: u64,
}

/// Fixed-capacity FIFO ring. Pushing at capacity drops the oldest element,
/// invokes `on_drop` with it, and advances; `dropped_count` never resets
/// on `clear` (it's a historical counter).
///
/// Guarded by a single `parking_lot::Mutex` so it is safe to share across
/// threads: head/tail/count are protected by the same lock on parallel
/// hosts rather than left to racing atomics.
pub struct CircularBuffer<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    dropped: AtomicU64,
    on_drop: Option<Box<dyn Fn(T) + Send + Sync>>,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))), dropped: AtomicU64::new(0), on_drop: None }
    }

    pub fn with_drop_callback(capacity: usize, on_drop: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self { on_drop: Some(Box::new(on_drop)), ..Self::new(capacity) }
    }

    /// Push `value`, dropping the oldest element if at capacity.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            if let Some(dropped) = inner.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(cb) = &self.on_drop {
                    cb(dropped);
                }
            }
        }
        inner.push_back(value);
    }

    pub fn shift(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().len() >= self.capacity
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn get_stats(&self) -> BufferStats {
        BufferStats { size: self.size(), capacity: self.capacity, dropped: self.dropped_count() }
    }
}

impl<T: Clone> CircularBuffer<T> {
    pub fn peek(&self) -> Option<T> {
        self.inner.lock().front().cloned()
    }

    /// Oldest-to-newest snapshot.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order_preserved() {
        let buf = CircularBuffer::new(10);
        for i in 0..5 {
            buf.push(i);
        }
        let mut out = Vec::new();
        for _ in 0..3 {
            out.push(buf.shift().unwrap());
        }
        assert_eq!(out, vec![0, 1, 2]);
        assert_eq!(buf.size(), 2);
    }

    #[test]
    fn capacity_one_drops_oldest() {
        let buf = CircularBuffer::new(1);
        buf.push('a');
        buf.push('b');
        assert_eq!(buf.shift(), Some('b'));
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.dropped_count(), 1);
    }

    #[test]
    fn drop_callback_is_invoked_with_dropped_element() {
        let dropped_values = Arc::new(Mutex::new(Vec::new()));
        let captured = dropped_values.clone();
        let buf = CircularBuffer::with_drop_callback(2, move |v: i32| captured.lock().push(v));
        buf.push(1);
        buf.push(2);
        buf.push(3);
        assert_eq!(*dropped_values.lock(), vec![1]);
    }

    #[test]
    fn clear_resets_size_but_not_dropped_count() {
        let buf = CircularBuffer::new(1);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.dropped_count(), 1);
        buf.clear();
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.dropped_count(), 1);
    }

    #[test]
    fn push_then_shift_property() {
        let buf: CircularBuffer<u32> = CircularBuffer::new(100);
        let pushed: Vec<u32> = (0..50).collect();
        for &v in &pushed {
            buf.push(v);
        }
        let mut popped = Vec::new();
        for _ in 0..30 {
            popped.push(buf.shift().unwrap());
        }
        assert_eq!(popped, pushed[..30]);
    }

    #[test]
    fn to_vec_is_oldest_to_newest() {
        let buf = CircularBuffer::new(3);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        assert_eq!(buf.to_vec(), vec![1, 2, 3]);
    }
}
