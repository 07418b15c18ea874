//! Bounded FIFO mailbox with blocking and non-blocking access.
//!
//! A [`BoundedQueue`] is a fixed-capacity ring buffer guarded by a mutex.
//! Blocking calls park on a condition variable until the paired operation
//! frees a slot (`put`) or fills one (`get`); the `*_no_wait` variants never
//! park and report failure instead.
//!
//! The number of occupied slots is never stored: it is derived from the
//! head/tail distance plus the [`FillState`], which disambiguates
//! `head == tail`.

use std::sync::{Condvar, Mutex, MutexGuard};

/// Fill state of a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// `head == tail` and no slot is occupied.
    Empty,
    /// `head != tail`.
    Middle,
    /// `head == tail` and every slot is occupied.
    Full,
}

struct Ring<T> {
    items: Vec<Option<T>>,
    head: usize,
    tail: usize,
    state: FillState,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let mut items = Vec::with_capacity(capacity);
        items.resize_with(capacity, || None);
        Self {
            items,
            head: 0,
            tail: 0,
            state: FillState::Empty,
        }
    }

    fn capacity(&self) -> usize {
        self.items.len()
    }

    fn len(&self) -> usize {
        match self.state {
            FillState::Empty => 0,
            FillState::Full => self.capacity(),
            FillState::Middle => (self.tail + self.capacity() - self.head) % self.capacity(),
        }
    }

    /// Caller must have checked `state != Full`.
    fn push(&mut self, item: T) {
        self.items[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
        self.state = if self.tail == self.head {
            FillState::Full
        } else {
            FillState::Middle
        };
    }

    fn pop(&mut self) -> Option<T> {
        if self.state == FillState::Empty {
            return None;
        }
        let item = self.items[self.head].take()?;
        self.head = (self.head + 1) % self.capacity();
        self.state = if self.head == self.tail {
            FillState::Empty
        } else {
            FillState::Middle
        };
        Some(item)
    }
}

/// Fixed-capacity, thread-safe FIFO queue.
///
/// Share it as `Arc<BoundedQueue<T>>`; every method takes `&self`.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// Returns `None` when `capacity` is zero, since such a queue could
    /// never make progress.
    pub fn new(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self {
            ring: Mutex::new(Ring::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert `item` at the tail, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut ring = self.lock();
        while ring.state == FillState::Full {
            ring = self.not_full.wait(ring).unwrap_or_else(|e| e.into_inner());
        }
        ring.push(item);
        drop(ring);
        self.not_empty.notify_one();
    }

    /// Remove the head item, blocking while the queue is empty.
    pub fn get(&self) -> T {
        let mut ring = self.lock();
        loop {
            if let Some(item) = ring.pop() {
                drop(ring);
                self.not_full.notify_one();
                return item;
            }
            ring = self.not_empty.wait(ring).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Insert `item` without blocking.
    ///
    /// When the queue is full nothing is inserted and the item is handed
    /// back in `Err`; `result.is_err()` is the "dropped" signal.
    pub fn put_no_wait(&self, item: T) -> Result<(), T> {
        let mut ring = self.lock();
        if ring.state == FillState::Full {
            return Err(item);
        }
        ring.push(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item without blocking. `None` when empty.
    pub fn get_no_wait(&self) -> Option<T> {
        let mut ring = self.lock();
        let item = ring.pop()?;
        drop(ring);
        self.not_full.notify_one();
        Some(item)
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state() == FillState::Empty
    }

    pub fn is_full(&self) -> bool {
        self.state() == FillState::Full
    }

    pub fn state(&self) -> FillState {
        self.lock().state
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &ring.capacity())
            .field("len", &ring.len())
            .field("state", &ring.state)
            .finish()
    }
}
