//! Bounded submission queue owned by a single thread.

use std::collections::VecDeque;

use crate::{QueueError, QueueResult};

/// Fixed-capacity FIFO of pending submissions.
///
/// Only the owning ring touches this queue, so it needs no synchronisation.
#[derive(Debug)]
pub struct SubmissionQueue<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> SubmissionQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free slots left before [`SubmissionQueue::push`] fails.
    pub fn space_left(&self) -> usize {
        self.capacity - self.entries.len()
    }

    /// Appends an entry; a full queue is left untouched.
    pub fn push(&mut self, entry: T) -> QueueResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Removes every pending entry in submission order.
    pub fn take_pending(&mut self) -> impl Iterator<Item = T> + '_ {
        self.entries.drain(..)
    }
}
