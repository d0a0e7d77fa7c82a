//! Futex-backed doorbell used to park completion waiters.
//!
//! Producers bump a 32-bit sequence and wake every parked waiter. A waiter
//! samples the sequence *before* checking its queue and parks only while the
//! sequence still holds the sampled value, so a wakeup between the check and
//! the park is never lost.

use std::sync::atomic::{AtomicU32, Ordering};

/// Result of parking on a doorbell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// The caller parked and was woken by a ring.
    Ok,
    /// The sequence had already moved past the sampled value.
    NotEqual,
}

/// Sequence counter that waiters park on until a producer rings it.
#[derive(Debug, Default)]
pub struct Doorbell {
    seq: AtomicU32,
}

impl Doorbell {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
        }
    }

    /// Current sequence value; pass it to [`Doorbell::wait_past`] after re-checking state.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    /// Advances the sequence and wakes all parked waiters.
    #[inline]
    pub fn ring(&self) {
        self.seq.fetch_add(1, Ordering::Release);
        atomic_wait::wake_all(&self.seq as *const AtomicU32);
    }

    /// Parks the caller until the sequence differs from `seen`.
    pub fn wait_past(&self, seen: u32) -> WaitResult {
        if self.seq.load(Ordering::Acquire) != seen {
            return WaitResult::NotEqual;
        }
        // Spurious futex returns are possible; loop until the value moved.
        while self.seq.load(Ordering::Acquire) == seen {
            atomic_wait::wait(&self.seq, seen);
        }
        WaitResult::Ok
    }
}
