//! Error handling helpers for the queue crate.
//!
//! Queues only fail in two ways: a bounded queue has no room left, or the
//! owning ring has been torn down and the queue no longer accepts entries.

use thiserror::Error;

/// Convenience result alias for fallible queue operations.
pub type QueueResult<T, E = QueueError> = Result<T, E>;

/// Errors surfaced by the queue primitives.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The bounded queue already holds `capacity` entries.
    #[error("queue full ({capacity} entries)")]
    Full { capacity: usize },

    /// The queue was closed by its owner and accepts no further entries.
    #[error("queue closed")]
    Closed,
}
