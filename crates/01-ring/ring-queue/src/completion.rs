//! Multi-producer / single-consumer completion queue.
//!
//! Any thread holding a reference may append events; the owning thread
//! consumes them in arrival order. Appends are serialised by a short mutex
//! critical section so an event is published whole or not at all, and a
//! [`Doorbell`] parks consumers while the queue is empty.
//!
//! Capacity is a soft bound: events appended past it are retained and counted
//! as overflow rather than dropped, so a valid delivery is never lost.

use std::collections::VecDeque;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::wait::Doorbell;
use crate::{QueueError, QueueResult};

/// A completion event as observed by the consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cqe {
    /// Opaque 64-bit correlation value echoed from the originating submission.
    pub user_data: u64,
    /// Payload echo on success, negative error code on failure.
    pub res: i32,
    /// Event flags carried alongside the result.
    pub flags: u32,
}

impl Cqe {
    pub const fn new(user_data: u64, res: i32) -> Self {
        Self {
            user_data,
            res,
            flags: 0,
        }
    }

    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Outcome of appending an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CqePush {
    /// Event stored within capacity.
    Posted,
    /// Event stored beyond capacity and counted as overflow.
    Overflowed,
}

#[derive(Debug)]
struct CqState {
    events: VecDeque<Cqe>,
    overflow: u64,
    closed: bool,
}

/// Completion queue shared between the owning consumer and remote producers.
#[derive(Debug)]
pub struct CompletionQueue {
    state: Mutex<CqState>,
    doorbell: Doorbell,
    capacity: usize,
}

impl CompletionQueue {
    /// Creates an empty queue holding `capacity` events before counting overflow.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CqState {
                events: VecDeque::with_capacity(capacity),
                overflow: 0,
                closed: false,
            }),
            doorbell: Doorbell::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends one event and wakes the consumer.
    ///
    /// Fails only once the queue has been closed; in that case nothing is stored.
    pub fn push(&self, cqe: Cqe) -> QueueResult<CqePush> {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let outcome = if state.events.len() >= self.capacity {
                state.overflow += 1;
                CqePush::Overflowed
            } else {
                CqePush::Posted
            };
            state.events.push_back(cqe);
            outcome
        };
        self.doorbell.ring();
        Ok(outcome)
    }

    /// Removes and returns the oldest event without blocking.
    pub fn try_pop(&self) -> Option<Cqe> {
        self.state.lock().events.pop_front()
    }

    /// Blocks until an event is available, then removes and returns the oldest one.
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed while empty.
    pub fn wait_one(&self) -> QueueResult<Cqe> {
        loop {
            let seen = self.doorbell.sequence();
            {
                let mut state = self.state.lock();
                if let Some(cqe) = state.events.pop_front() {
                    return Ok(cqe);
                }
                if state.closed {
                    return Err(QueueError::Closed);
                }
            }
            self.doorbell.wait_past(seen);
        }
    }

    /// Removes up to `max` events without blocking.
    pub fn drain(&self, max: usize) -> SmallVec<[Cqe; 8]> {
        let mut state = self.state.lock();
        let take = max.min(state.events.len());
        state.events.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events that were appended while the queue was at capacity.
    pub fn overflow_count(&self) -> u64 {
        self.state.lock().overflow
    }

    /// Closes the queue, discarding unconsumed events, and wakes any waiter.
    ///
    /// Returns the number of events discarded. Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            let discarded = state.events.len();
            state.events.clear();
            discarded
        };
        self.doorbell.ring();
        discarded
    }
}
