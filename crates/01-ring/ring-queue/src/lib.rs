//! Queue primitives backing a ring instance.
//!
//! This crate exposes the pieces a ring is assembled from:
//! * [`CompletionQueue`] – multi-producer/single-consumer event queue with a blocking wait.
//! * [`SubmissionQueue`] – bounded FIFO of pending submissions owned by one thread.
//! * [`Doorbell`] – futex-backed sequence counter used to park completion waiters.
//! * [`QueueError`] – small error surface for full/closed queues.

mod completion;
mod error;
mod submission;
pub mod wait;

pub use completion::{Cqe, CqePush, CompletionQueue};
pub use error::{QueueError, QueueResult};
pub use submission::SubmissionQueue;
pub use wait::Doorbell;
