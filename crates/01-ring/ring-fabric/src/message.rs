//! Submission shapes accepted by a ring.
//!
//! A [`MessageSubmission`] carries every delivery variant through orthogonal
//! fields: [`TargetRef`] picks the addressing mode and [`DeliveryMode`] picks
//! between the synchronous fast path and the deferred submission pipeline.

use std::fmt;

use crate::registry::Handle;

/// How the target ring is named.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// A raw handle looked up in the registry.
    Handle(Handle),
    /// An index into the source ring's fixed-file table.
    Fixed(u32),
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Handle(handle) => write!(f, "handle {handle}"),
            TargetRef::Fixed(index) => write!(f, "fixed slot {index}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Resolved and applied during the call; the outcome is the return value.
    Synchronous,
    /// Queued on the source's submission queue and acknowledged by a local completion.
    #[default]
    Deferred,
}

/// A message to inject into another ring's completion queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageSubmission {
    pub target: TargetRef,
    /// Echoed as the `res` of the target-side completion.
    pub payload: u32,
    /// Echoed as the `user_data` of the target-side completion.
    pub tag: u64,
    pub mode: DeliveryMode,
    /// Local correlation id carried by the source-side acknowledgement.
    pub user_data: u64,
    /// Flags passed through to the target-side completion.
    pub target_flags: Option<u32>,
    /// Suppress the local acknowledgement when delivery succeeds.
    pub skip_success_ack: bool,
}

impl MessageSubmission {
    pub fn new(target: TargetRef, payload: u32, tag: u64) -> Self {
        Self {
            target,
            payload,
            tag,
            mode: DeliveryMode::Deferred,
            user_data: 0,
            target_flags: None,
            skip_success_ack: false,
        }
    }

    pub fn to_handle(handle: Handle, payload: u32, tag: u64) -> Self {
        Self::new(TargetRef::Handle(handle), payload, tag)
    }

    pub fn to_fixed(index: u32, payload: u32, tag: u64) -> Self {
        Self::new(TargetRef::Fixed(index), payload, tag)
    }

    pub fn synchronous(mut self) -> Self {
        self.mode = DeliveryMode::Synchronous;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn with_target_flags(mut self, flags: u32) -> Self {
        self.target_flags = Some(flags);
        self
    }

    pub fn skip_success_ack(mut self) -> Self {
        self.skip_success_ack = true;
        self
    }
}

/// Entry placed on a ring's submission queue.
///
/// Messages on the queue always take the deferred path, whatever their
/// `mode` field says.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sqe {
    /// Completes locally with result 0.
    Nop { user_data: u64 },
    MsgRing(MessageSubmission),
}

impl From<MessageSubmission> for Sqe {
    fn from(msg: MessageSubmission) -> Self {
        Sqe::MsgRing(msg)
    }
}

/// How a posted message was accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Posted {
    /// Synchronous delivery completed; the target already holds the event.
    Delivered,
    /// Deferred submission issued; a local completion with `user_data` reports the outcome.
    Submitted { user_data: u64 },
}
