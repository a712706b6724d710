//! Fixed-capacity ring buffer shared by connection handlers and workers.
//!
//! A capacity of `C` gives `C - 1` usable slots: one slot always stays free
//! so that `front == rear` means empty and `(rear + 1) % C == front` means full.
//!
//! Waiting is deadline-bounded. Instead of polling the lock, waiters park on a
//! [`Notify`] that is armed *before* the ring is inspected, so a put or get that
//! lands between the check and the wait is never missed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

struct Ring<T> {
    slots: Vec<Option<T>>,
    front: usize,
    rear: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            front: 0,
            rear: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.front == self.rear
    }

    fn is_full(&self) -> bool {
        (self.rear + 1) % self.capacity() == self.front
    }

    fn len(&self) -> usize {
        (self.rear + self.capacity() - self.front) % self.capacity()
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.rear] = Some(item);
        self.rear = (self.rear + 1) % self.capacity();
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.front].take();
        self.front = (self.front + 1) % self.capacity();
        item
    }

    fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.front = 0;
        self.rear = 0;
    }
}

/// A bounded FIFO queue safe for concurrent producers and consumers.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with `capacity` slots (`capacity - 1` usable).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is less than 2.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "queue capacity must be at least 2");
        Self {
            ring: Mutex::new(Ring::new(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring<T>> {
        // Ring operations never panic mid-update, so a poisoned lock still
        // guards consistent indices.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert without waiting. The item is handed back when the queue is full.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        let pushed = self.ring().push(item);
        if pushed.is_ok() {
            self.not_empty.notify_one();
        }
        pushed
    }

    /// Remove the oldest item without waiting.
    pub fn try_get(&self) -> Option<T> {
        let item = self.ring().pop();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Insert `item`, waiting for free space until `deadline`.
    ///
    /// On timeout the item is returned so the caller can decide whether to
    /// drop it or try again.
    pub async fn put(&self, mut item: T, deadline: Instant) -> Result<(), T> {
        loop {
            let space = self.not_full.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.try_put(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }

            if timeout_at(deadline, space).await.is_err() {
                return Err(item);
            }
        }
    }

    /// Remove the oldest item, waiting for one to arrive until `deadline`.
    pub async fn get(&self, deadline: Instant) -> Option<T> {
        loop {
            let arrival = self.not_empty.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(item) = self.try_get() {
                return Some(item);
            }

            if timeout_at(deadline, arrival).await.is_err() {
                return None;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring().is_full()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.ring().len()
    }

    /// Total slots, including the one that is never filled.
    pub fn capacity(&self) -> usize {
        self.ring().capacity()
    }

    /// Drop every queued item and reset the indices.
    ///
    /// Only meant for use between runs, never while producers or consumers are active.
    pub fn clear(&self) {
        self.ring().clear();
        self.not_full.notify_waiters();
    }
}
