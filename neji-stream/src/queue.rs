//! Bounded drop-oldest queue shared between pipeline stages.
//!
//! Producers never block: once the queue holds `capacity` items, every new
//! insert evicts the oldest one first. Consumers block on a condition
//! variable until an item arrives or the queue is closed.
//!
//! ```text
//!  enqueue ──▶ [ oldest … newest ] ──▶ dequeue
//!                 ▲ evicted when full
//! ```

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity MPMC FIFO with drop-oldest overflow.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        })
    }

    /// Append an item, evicting the oldest one if the queue is full.
    ///
    /// Never blocks. Items pushed after [`close`](Self::close) are discarded.
    pub fn enqueue(&self, item: T) {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.items.push_back(item);
            let evicted = if state.items.len() > self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            self.available.notify_one();
            evicted
        };

        // Drop the evicted item outside the lock
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_for(&mut state, timeout).timed_out() {
                return state.items.pop_front();
            }
        }
    }

    /// Remove the oldest item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Close the queue and wake every waiting consumer.
    ///
    /// Buffered items are still handed out; `dequeue` returns `None` only when
    /// nothing is left.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    /// Close the queue and discard everything still buffered.
    pub fn close_and_clear(&self) {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            self.available.notify_all();
            std::mem::take(&mut state.items)
        };
        self.dropped
            .fetch_add(discarded.len() as u64, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items evicted or discarded so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            BoundedQueue::<u32>::new(0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fifo_order_at_capacity() {
        let queue = BoundedQueue::new(4).unwrap();
        for i in 0..4 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 4);
        let drained: Vec<_> = (0..4).map(|_| queue.dequeue().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_overflow_keeps_most_recent() {
        let queue = BoundedQueue::new(3).unwrap();
        for i in 0..8 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 5);

        let mut drained = Vec::new();
        while let Some(v) = queue.try_dequeue() {
            drained.push(v);
        }
        assert_eq!(drained, vec![5, 6, 7]);
    }

    #[test]
    fn test_dequeue_blocks_until_enqueue() {
        let queue = Arc::new(BoundedQueue::new(2).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        queue.enqueue("frame-7");
        assert_eq!(consumer.join().unwrap(), Some("frame-7"));
    }

    #[test]
    fn test_no_lost_wakeups() {
        let queue = Arc::new(BoundedQueue::new(1024).unwrap());
        let per_producer = 500;

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(v) = queue.dequeue() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.enqueue(p * per_producer + i);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut all: Vec<_> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..4 * per_producer).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_wakes_waiting_consumers() {
        let queue = Arc::new(BoundedQueue::<u8>::new(1).unwrap());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.dequeue())
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        queue.close();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
    }

    #[test]
    fn test_close_still_drains_buffered_items() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.close();
        queue.enqueue(3); // discarded

        assert!(queue.is_closed());
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_close_and_clear_counts_discarded() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.enqueue('a');
        queue.enqueue('b');
        queue.close_and_clear();
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn test_dequeue_timeout() {
        let queue = BoundedQueue::<u32>::new(2).unwrap();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(10)), None);
        queue.enqueue(9);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(10)), Some(9));
    }
}
