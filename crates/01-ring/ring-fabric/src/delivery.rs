//! Delivery engine: resolve a target, validate it, append one completion.
//!
//! Both delivery modes share these steps. The synchronous path runs them on the
//! caller and returns the outcome; the deferred path runs them while a ring
//! issues its submission queue and reports the outcome as a local completion.
//!
//! A ring that is not yet enabled rejects deliveries immediately with
//! [`RingError::TargetDisabled`]; nothing is queued for later.

use std::sync::Arc;

use ring_queue::Cqe;
use tracing::debug;

use crate::error::{RingError, RingResult};
use crate::files::FixedFileTable;
use crate::message::{MessageSubmission, TargetRef};
use crate::registry::Registry;
use crate::ring::{RingShared, RingState};

pub(crate) struct DeliveryEngine<'a> {
    registry: &'a Registry,
    files: Option<&'a FixedFileTable>,
}

impl<'a> DeliveryEngine<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            files: None,
        }
    }

    /// Uses `files` to resolve fixed-index targets.
    pub(crate) fn with_fixed_files(mut self, files: &'a FixedFileTable) -> Self {
        self.files = Some(files);
        self
    }

    /// Maps a target reference to a live ring. Never touches the target.
    pub(crate) fn resolve(&self, target: TargetRef) -> RingResult<Arc<RingShared>> {
        let handle = match target {
            TargetRef::Handle(handle) => handle,
            TargetRef::Fixed(index) => {
                let files = self.files.ok_or(RingError::InvalidArgument(
                    "fixed addressing requires a source ring",
                ))?;
                files.get(index).ok_or(RingError::InvalidTarget(target))?
            }
        };
        self.registry
            .resolve_ring(handle)
            .ok_or(RingError::InvalidTarget(target))
    }

    /// Runs every step on the calling thread.
    pub(crate) fn post_sync(&self, msg: &MessageSubmission) -> RingResult<()> {
        let caps = self.registry.capabilities();
        if !caps.msg_ring || !caps.sync_msg {
            return Err(RingError::Unsupported("synchronous ring messages"));
        }
        let outcome = self.resolve(msg.target).and_then(|target| deliver(&target, msg));
        if let Err(err) = &outcome {
            debug!(dest = %msg.target, tag = msg.tag, %err, "sync message rejected");
        }
        outcome
    }
}

/// Appends the message's event to an already resolved target.
pub(crate) fn deliver(target: &RingShared, msg: &MessageSubmission) -> RingResult<()> {
    match target.state() {
        RingState::Enabled => {}
        RingState::Disabled => return Err(RingError::TargetDisabled(target.handle())),
        RingState::Destroyed => return Err(RingError::InvalidTarget(msg.target)),
    }
    let cqe = Cqe::new(msg.tag, msg.payload as i32).with_flags(msg.target_flags.unwrap_or(0));
    // A ring torn down after the state check has already closed its queue.
    target
        .cq()
        .push(cqe)
        .map_err(|_| RingError::InvalidTarget(msg.target))?;
    Ok(())
}

/// Local acknowledgement for a deferred message, if one is due.
pub(crate) fn ack(msg: &MessageSubmission, outcome: &RingResult<()>) -> Option<Cqe> {
    match outcome {
        Ok(()) if msg.skip_success_ack => None,
        Ok(()) => Some(Cqe::new(msg.user_data, 0)),
        Err(err) => {
            debug!(dest = %msg.target, tag = msg.tag, %err, "deferred message rejected");
            Some(Cqe::new(msg.user_data, err.errno()))
        }
    }
}
