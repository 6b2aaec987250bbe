//! Bounded blocking FIFO queue built on a single `Mutex` + `Condvar` monitor.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time;

use crate::config::QueueConfig;
use crate::errors::{ConfigError, EnqueueError};
use crate::synca::{lock_recover, wait_recover};

/// Upper bound on the buffer reserved up front, larger queues grow on demand.
const MAX_PREALLOCATED: usize = 1024;

/// A fixed capacity, thread-safe FIFO queue.
///
/// Producers calling [`BoundedQueue::enqueue`] block while the queue holds
/// `capacity` items and consumers calling [`BoundedQueue::dequeue`] block
/// while it is empty. Producers and consumers park on the same condition,
/// so every state change wakes all of them and each re-checks its own
/// predicate.
///
/// Cloning a `BoundedQueue` hands out another handle to the same queue.
///
/// # Examples
///
/// ```
/// use foundation_monitors::BoundedQueue;
/// use std::thread;
///
/// let queue = BoundedQueue::new(5).expect("valid capacity");
///
/// let producer_queue = queue.clone();
/// let producer = thread::spawn(move || {
///     for i in 0..10 {
///         producer_queue.enqueue(i);
///     }
/// });
///
/// let received: Vec<i32> = (0..10).map(|_| queue.dequeue()).collect();
/// producer.join().unwrap();
///
/// assert_eq!(received, (0..10).collect::<Vec<_>>());
/// ```
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    event: Condvar,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> core::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

// --- constructors

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity("BoundedQueue"));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED))),
                event: Condvar::new(),
                capacity,
            }),
        })
    }

    /// # Errors
    ///
    /// Same as [`BoundedQueue::new`].
    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        Self::new(config.capacity)
    }
}

// --- core blocking operations

impl<T> BoundedQueue<T> {
    /// Appends `item` to the tail of the queue, blocking for as long as
    /// the queue is full. It never fails and never times out.
    pub fn enqueue(&self, item: T) {
        let mut items = lock_recover(&self.inner.items);
        while items.len() >= self.inner.capacity {
            tracing::trace!("BoundedQueue is full, producer waiting");
            items = wait_recover(&self.inner.event, items);
        }

        items.push_back(item);
        drop(items);
        self.inner.event.notify_all();
    }

    /// Removes and returns the head of the queue, blocking for as long as
    /// the queue is empty.
    pub fn dequeue(&self) -> T {
        let mut items = lock_recover(&self.inner.items);
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.inner.event.notify_all();
                return item;
            }

            tracing::trace!("BoundedQueue is empty, consumer waiting");
            items = wait_recover(&self.inner.event, items);
        }
    }
}

// --- non-blocking and timed extensions

impl<T> BoundedQueue<T> {
    /// Appends `item` only if there is room right now.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] with the item when the queue is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        let mut items = lock_recover(&self.inner.items);
        if items.len() >= self.inner.capacity {
            return Err(EnqueueError::Full(item));
        }

        items.push_back(item);
        drop(items);
        self.inner.event.notify_all();
        Ok(())
    }

    /// Removes the head of the queue if there is one.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut items = lock_recover(&self.inner.items);
        let item = items.pop_front();
        drop(items);

        if item.is_some() {
            self.inner.event.notify_all();
        }
        item
    }

    /// Like [`BoundedQueue::enqueue`] but waits at most `timeout` for room.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::TimedOut`] with the item when the queue
    /// stayed full for the whole timeout.
    pub fn enqueue_timeout(&self, item: T, timeout: time::Duration) -> Result<(), EnqueueError<T>> {
        let capacity = self.inner.capacity;
        let items = lock_recover(&self.inner.items);
        let (mut items, _) = self
            .inner
            .event
            .wait_timeout_while(items, timeout, |items| items.len() >= capacity)
            .unwrap_or_else(PoisonError::into_inner);

        if items.len() >= capacity {
            return Err(EnqueueError::TimedOut(item));
        }

        items.push_back(item);
        drop(items);
        self.inner.event.notify_all();
        Ok(())
    }

    /// Like [`BoundedQueue::dequeue`] but waits at most `timeout` for an item.
    pub fn dequeue_timeout(&self, timeout: time::Duration) -> Option<T> {
        let items = lock_recover(&self.inner.items);
        let (mut items, _) = self
            .inner
            .event
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        let item = items.pop_front();
        drop(items);

        if item.is_some() {
            self.inner.event.notify_all();
        }
        item
    }
}

// --- introspection

impl<T> BoundedQueue<T> {
    /// Returns the number of items currently queued. The value may be
    /// stale as soon as it is returned.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_recover(&self.inner.items).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.inner.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

#[cfg(test)]
mod test_bounded_queue {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    use ntest::timeout;

    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        let result = BoundedQueue::<u32>::new(0);
        assert!(matches!(result, Err(ConfigError::ZeroCapacity("BoundedQueue"))));
    }

    #[test]
    fn builds_from_config() {
        let queue = BoundedQueue::<u32>::from_config(&QueueConfig { capacity: 3 })
            .expect("should create queue");
        assert_eq!(queue.capacity(), 3);
        assert!(queue.is_empty());
        assert!(!queue.is_full());
    }

    #[test]
    fn accepts_any_positive_capacity() {
        let queue = BoundedQueue::<u64>::new(usize::MAX).expect("should create queue");
        assert_eq!(queue.capacity(), usize::MAX);

        for item in 0..2000 {
            assert!(queue.try_enqueue(item).is_ok());
        }
        assert_eq!(queue.len(), 2000);
        assert!(!queue.is_full());
        assert_eq!(queue.dequeue(), 0);
    }

    #[test]
    #[timeout(5000)]
    fn dequeues_in_enqueue_order() {
        let queue = BoundedQueue::new(4).expect("should create queue");

        let producer_queue = queue.clone();
        let producer = thread::spawn(move || {
            for i in 0..100 {
                producer_queue.enqueue(i);
            }
        });

        let received: Vec<i32> = (0..100).map(|_| queue.dequeue()).collect();
        producer.join().expect("producer should finish");

        assert_eq!(received, (0..100).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    #[timeout(5000)]
    fn sixth_enqueue_blocks_until_dequeue() {
        let queue = BoundedQueue::new(5).expect("should create queue");
        for i in 0..5 {
            queue.enqueue(i);
        }
        assert!(queue.is_full());

        let (sender, receiver) = mpsc::channel();
        let producer_queue = queue.clone();
        let producer = thread::spawn(move || {
            producer_queue.enqueue(5);
            sender.send(()).expect("should send");
        });

        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(queue.len(), 5);

        assert_eq!(queue.dequeue(), 0);
        receiver
            .recv_timeout(Duration::from_secs(2))
            .expect("blocked producer should return promptly after a dequeue");
        producer.join().expect("producer should finish");

        assert_eq!(queue.len(), 5);
        let drained: Vec<i32> = (0..5).map(|_| queue.dequeue()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    #[timeout(5000)]
    fn dequeue_blocks_until_enqueue() {
        let queue = BoundedQueue::new(1).expect("should create queue");

        let consumer_queue = queue.clone();
        let consumer = thread::spawn(move || consumer_queue.dequeue());

        thread::sleep(Duration::from_millis(100));
        assert!(!consumer.is_finished());

        queue.enqueue("item");
        assert_eq!(consumer.join().expect("consumer should finish"), "item");
    }

    #[test]
    fn try_variants_do_not_block() {
        let queue = BoundedQueue::new(1).expect("should create queue");

        assert_eq!(queue.try_dequeue(), None);
        assert!(queue.try_enqueue(1).is_ok());

        let rejected = queue.try_enqueue(2).expect_err("queue should be full");
        assert!(rejected.is_full());
        assert_eq!(rejected.into_inner(), 2);

        assert_eq!(queue.try_dequeue(), Some(1));
    }

    #[test]
    #[timeout(5000)]
    fn timed_variants_give_up_after_timeout() {
        let queue = BoundedQueue::new(1).expect("should create queue");

        let started = Instant::now();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(100)), None);
        assert!(started.elapsed() >= Duration::from_millis(100));

        queue.enqueue(7);

        let started = Instant::now();
        let rejected = queue
            .enqueue_timeout(8, Duration::from_millis(100))
            .expect_err("queue should stay full");
        assert!(rejected.is_timed_out());
        assert_eq!(rejected.into_inner(), 8);
        assert!(started.elapsed() >= Duration::from_millis(100));

        assert_eq!(queue.dequeue_timeout(Duration::from_millis(100)), Some(7));
    }

    #[test]
    #[timeout(5000)]
    fn timed_enqueue_succeeds_when_room_appears() {
        let queue = BoundedQueue::new(1).expect("should create queue");
        queue.enqueue(1);

        let consumer_queue = queue.clone();
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            consumer_queue.dequeue()
        });

        assert!(queue.enqueue_timeout(2, Duration::from_secs(2)).is_ok());
        assert_eq!(consumer.join().expect("consumer should finish"), 1);
        assert_eq!(queue.dequeue(), 2);
    }

    #[test]
    #[timeout(10000)]
    fn size_never_exceeds_capacity_under_contention() {
        let capacity = 3;
        let queue = BoundedQueue::new(capacity).expect("should create queue");
        let producers = 4;
        let per_producer = 250;
        let done = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));

        let watcher = {
            let queue = queue.clone();
            let done = done.clone();
            let violations = violations.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    if queue.len() > capacity {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::yield_now();
                }
            })
        };

        let mut handles = vec![];
        for producer_id in 0..producers {
            let queue = queue.clone();
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(producer_id * 1000 + i);
                }
            }));
        }

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    for _ in 0..(producers * per_producer / 2) {
                        seen.push(queue.dequeue());
                    }
                    seen
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("producer should finish");
        }

        let mut all: Vec<usize> = consumers
            .into_iter()
            .flat_map(|c| c.join().expect("consumer should finish"))
            .collect();

        done.store(true, Ordering::Release);
        watcher.join().expect("watcher should finish");

        assert_eq!(violations.load(Ordering::SeqCst), 0);

        // nothing lost or duplicated.
        all.sort_unstable();
        let mut expected: Vec<usize> = (0..producers)
            .flat_map(|p| (0..per_producer).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }
}
