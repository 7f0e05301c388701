use crate::event::PrioritizedEvent;
use parking_lot::{Condvar, Mutex};
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

/// Fixed-capacity priority queue keyed by `(priority, sequence)`.
///
/// One mutex guards the heap; two condition variables (`not_full`, `not_empty`) support
/// blocking `put`/`get` with timeouts. Among equal-priority events, `get` returns them in
/// enqueue order because the monotonic sequence breaks ties. Across priorities, higher
/// priority strictly precedes lower.
///
/// Refusals are sentinels (`false` / `None`) - nothing panics and nothing blocks forever
/// unless explicitly asked to (`block = true`, `timeout = None`).
#[derive(Debug)]
pub struct BoundedPriorityQueue<T> {
    capacity: usize,
    heap: Mutex<BinaryHeap<Reverse<PrioritizedEvent<T>>>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedPriorityQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue an event.
    ///
    /// Non-blocking (`block = false`): returns `false` immediately if the queue is full.
    /// Blocking: waits on `not_full` for up to `timeout` (forever if `None`).
    pub fn put(&self, event: PrioritizedEvent<T>, block: bool, timeout: Option<Duration>) -> bool {
        let mut heap = self.heap.lock();

        if heap.len() >= self.capacity {
            if !block {
                return false;
            }

            let deadline = timeout.map(|timeout| Instant::now() + timeout);
            while heap.len() >= self.capacity {
                match deadline {
                    Some(deadline) => {
                        if self.not_full.wait_until(&mut heap, deadline).timed_out()
                            && heap.len() >= self.capacity
                        {
                            return false;
                        }
                    }
                    None => self.not_full.wait(&mut heap),
                }
            }
        }

        heap.push(Reverse(event));
        drop(heap);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue the highest-priority event.
    ///
    /// Non-blocking: returns `None` immediately if the queue is empty. Blocking: waits on
    /// `not_empty` for up to `timeout` (forever if `None`).
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Option<PrioritizedEvent<T>> {
        let mut heap = self.heap.lock();

        if heap.is_empty() {
            if !block {
                return None;
            }

            let deadline = timeout.map(|timeout| Instant::now() + timeout);
            while heap.is_empty() {
                match deadline {
                    Some(deadline) => {
                        if self.not_empty.wait_until(&mut heap, deadline).timed_out()
                            && heap.is_empty()
                        {
                            return None;
                        }
                    }
                    None => self.not_empty.wait(&mut heap),
                }
            }
        }

        let event = heap.pop().map(|Reverse(event)| event);
        drop(heap);
        self.not_full.notify_one();
        event
    }

    /// Snapshot of the current queue length.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.lock().len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all queued events, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let mut heap = self.heap.lock();
        let drained = heap.len();
        heap.clear();
        drop(heap);
        self.not_full.notify_all();
        drained
    }

    /// Wake every thread blocked on this queue so it can re-check its stop condition.
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
