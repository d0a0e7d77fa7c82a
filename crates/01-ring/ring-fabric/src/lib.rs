//! Ring instances and cross-ring message delivery.
//!
//! * [`Registry`] – handle namespace shared by every ring, plus platform [`Capabilities`].
//! * [`RingInstance`] – an owned ring: submission queue, completion queue, fixed-file table.
//! * [`MessageSubmission`] – one message, addressed by handle or fixed index, sent
//!   synchronously or through the submission queue.
//! * [`RingError`] – engine errors and the negative result codes they map to.

mod delivery;
mod error;
mod files;
mod message;
mod registry;
mod ring;
mod runtime;

pub use error::{errno, is_unsupported_result, RingError, RingResult};
pub use files::{FixedFileTable, FIXED_FILE_LIMIT};
pub use message::{DeliveryMode, MessageSubmission, Posted, Sqe, TargetRef};
pub use registry::{Capabilities, Handle, Registry};
pub use ring::{RingInstance, RingState, SetupFlags, MAX_ENTRIES};
pub use ring_queue::Cqe;
