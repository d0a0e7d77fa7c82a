//! Ring instances: a submission queue, a completion queue, and a fixed-file table.
//!
//! A [`RingInstance`] is owned by one thread. The part other threads can reach
//! ([`RingShared`]: the completion queue and lifecycle state) lives behind an
//! `Arc` and is registered weakly in the [`Registry`], so delivery from
//! elsewhere never extends a ring's life past [`RingInstance::destroy`].
//!
//! Lifecycle is `Disabled -> Enabled -> Destroyed`, with no way back.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ring_queue::{CompletionQueue, Cqe, SubmissionQueue};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::delivery::{ack, deliver, DeliveryEngine};
use crate::error::{errno, RingError, RingResult};
use crate::files::FixedFileTable;
use crate::message::{DeliveryMode, MessageSubmission, Posted, Sqe, TargetRef};
use crate::registry::{Handle, Registry};
use crate::runtime::{OffloadJob, OffloadWorker};

/// Largest submission queue depth accepted by [`RingInstance::new`].
pub const MAX_ENTRIES: u32 = 32_768;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingState {
    Disabled = 0,
    Enabled = 1,
    Destroyed = 2,
}

impl RingState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RingState::Disabled,
            1 => RingState::Enabled,
            _ => RingState::Destroyed,
        }
    }
}

/// Setup options fixed at ring creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetupFlags {
    /// Start in `Disabled`; deliveries are rejected until [`RingInstance::enable`].
    pub r_disabled: bool,
    /// Only the creating (or enabling) thread may submit.
    pub single_issuer: bool,
    /// Post local completions only when the owner waits. Requires `single_issuer`.
    pub defer_taskrun: bool,
    /// Issue deferred messages on a background worker thread.
    pub offload: bool,
}

impl SetupFlags {
    pub const fn defer_taskrun() -> Self {
        Self {
            r_disabled: false,
            single_issuer: true,
            defer_taskrun: true,
            offload: false,
        }
    }

    pub const fn offload() -> Self {
        Self {
            r_disabled: false,
            single_issuer: false,
            defer_taskrun: false,
            offload: true,
        }
    }

    pub const fn disabled(mut self) -> Self {
        self.r_disabled = true;
        self
    }
}

/// State reachable from other threads.
pub(crate) struct RingShared {
    handle: Handle,
    cq: CompletionQueue,
    state: AtomicU8,
}

impl RingShared {
    fn new(handle: Handle, cq_capacity: usize, state: RingState) -> Self {
        Self {
            handle,
            cq: CompletionQueue::new(cq_capacity),
            state: AtomicU8::new(state as u8),
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn cq(&self) -> &CompletionQueue {
        &self.cq
    }

    pub(crate) fn state(&self) -> RingState {
        RingState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: RingState, to: RingState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

pub struct RingInstance {
    shared: Arc<RingShared>,
    registry: Arc<Registry>,
    flags: SetupFlags,
    entries: u32,
    sq: SubmissionQueue<Sqe>,
    files: FixedFileTable,
    task_work: Vec<Cqe>,
    issuer: Option<ThreadId>,
    offload: Option<OffloadWorker>,
}

impl RingInstance {
    /// Creates a ring with `entries` submission slots (rounded up to a power of two).
    ///
    /// The completion queue holds twice that many events before counting overflow.
    pub fn new(registry: &Arc<Registry>, entries: u32, flags: SetupFlags) -> RingResult<Self> {
        if entries == 0 || entries > MAX_ENTRIES {
            return Err(RingError::InvalidArgument(
                "ring entries must be within 1..=32768",
            ));
        }
        let caps = registry.capabilities();
        if flags.defer_taskrun && !flags.single_issuer {
            return Err(RingError::InvalidArgument(
                "defer_taskrun requires single_issuer",
            ));
        }
        if flags.defer_taskrun && flags.offload {
            return Err(RingError::InvalidArgument(
                "defer_taskrun cannot be combined with offload",
            ));
        }
        if flags.defer_taskrun && !caps.defer_taskrun {
            return Err(RingError::InvalidArgument("defer_taskrun not supported"));
        }
        if flags.r_disabled && !caps.disabled_rings {
            return Err(RingError::InvalidArgument("disabled rings not supported"));
        }

        let entries = entries.next_power_of_two();
        let initial = if flags.r_disabled {
            RingState::Disabled
        } else {
            RingState::Enabled
        };
        let shared = registry.install_ring(|handle| {
            Arc::new(RingShared::new(handle, entries as usize * 2, initial))
        });

        let offload = if flags.offload {
            match OffloadWorker::spawn(shared.handle()) {
                Ok(worker) => Some(worker),
                Err(err) => {
                    registry.remove(shared.handle());
                    shared.cq().close();
                    return Err(err);
                }
            }
        } else {
            None
        };

        let issuer = (flags.single_issuer && !flags.r_disabled).then(|| thread::current().id());
        debug!(ring = %shared.handle(), entries, ?flags, "ring created");

        Ok(Self {
            shared,
            registry: Arc::clone(registry),
            flags,
            entries,
            sq: SubmissionQueue::new(entries as usize),
            files: FixedFileTable::new(),
            task_work: Vec::new(),
            issuer,
            offload,
        })
    }

    pub fn handle(&self) -> Handle {
        self.shared.handle()
    }

    pub fn state(&self) -> RingState {
        self.shared.state()
    }

    pub fn entries(&self) -> u32 {
        self.entries
    }

    /// Moves a ring created with `r_disabled` into `Enabled`. Allowed once.
    pub fn enable(&mut self) -> RingResult<()> {
        if !self
            .shared
            .transition(RingState::Disabled, RingState::Enabled)
        {
            return Err(RingError::InvalidArgument("ring is not disabled"));
        }
        if self.flags.single_issuer {
            self.issuer = Some(thread::current().id());
        }
        debug!(ring = %self.handle(), "ring enabled");
        Ok(())
    }

    pub fn fixed_files(&self) -> &FixedFileTable {
        &self.files
    }

    /// Installs a fixed-file table with `handles` at indices `0..handles.len()`.
    pub fn register_files(&mut self, handles: &[Handle]) -> RingResult<()> {
        for handle in handles {
            self.check_open(*handle)?;
        }
        self.files.install(handles)
    }

    /// Registers `handle` at `index`, growing the table as needed.
    pub fn register_file(&mut self, index: u32, handle: Handle) -> RingResult<()> {
        self.check_open(handle)?;
        self.files.set(index, handle)
    }

    /// Clears the slot at `index` and returns the handle it held.
    pub fn unregister_file(&mut self, index: u32) -> RingResult<Handle> {
        self.files.clear_slot(index)
    }

    /// Drops the whole fixed-file table.
    pub fn unregister_files(&mut self) -> RingResult<()> {
        self.files.clear()
    }

    /// Places an entry on the submission queue without issuing it.
    pub fn queue(&mut self, sqe: impl Into<Sqe>) -> RingResult<()> {
        let capacity = self.sq.capacity();
        self.sq
            .push(sqe.into())
            .map_err(|_| RingError::SubmissionQueueFull { capacity })
    }

    pub fn pending_submissions(&self) -> usize {
        self.sq.len()
    }

    /// Issues every queued entry and returns how many were issued.
    pub fn submit(&mut self) -> RingResult<usize> {
        self.check_can_submit()?;
        let pending: SmallVec<[Sqe; 8]> = self.sq.take_pending().collect();
        let issued = pending.len();
        for sqe in pending {
            self.issue(sqe);
        }
        Ok(issued)
    }

    /// Sends one message in the mode it names.
    ///
    /// Synchronous messages return the delivery outcome directly and add
    /// nothing to this ring's completion queue (unless this ring is the target).
    /// Deferred messages are queued and submitted; their outcome arrives as a
    /// local completion carrying `msg.user_data`.
    pub fn post_message(&mut self, msg: MessageSubmission) -> RingResult<Posted> {
        match msg.mode {
            DeliveryMode::Synchronous => {
                DeliveryEngine::new(&self.registry)
                    .with_fixed_files(&self.files)
                    .post_sync(&msg)?;
                Ok(Posted::Delivered)
            }
            DeliveryMode::Deferred => {
                // A rejected post must not leave its entry behind for a later submit.
                self.check_can_submit()?;
                self.queue(Sqe::MsgRing(msg))?;
                self.submit()?;
                Ok(Posted::Submitted {
                    user_data: msg.user_data,
                })
            }
        }
    }

    /// Blocks until a completion is available and returns the oldest one.
    pub fn wait_one(&mut self) -> RingResult<Cqe> {
        self.run_task_work();
        self.shared
            .cq()
            .wait_one()
            .map_err(|_| RingError::InvalidTarget(TargetRef::Handle(self.handle())))
    }

    /// Returns the oldest completion without blocking.
    pub fn try_cqe(&mut self) -> Option<Cqe> {
        self.run_task_work();
        self.shared.cq().try_pop()
    }

    /// Removes up to `max` completions without blocking.
    pub fn drain(&mut self, max: usize) -> SmallVec<[Cqe; 8]> {
        self.run_task_work();
        self.shared.cq().drain(max)
    }

    /// Posts acknowledgements held back by `defer_taskrun`. Returns how many were posted.
    pub fn run_task_work(&mut self) -> usize {
        let mut posted = 0;
        for cqe in self.task_work.drain(..) {
            if self.shared.cq().push(cqe).is_ok() {
                posted += 1;
            }
        }
        posted
    }

    pub fn pending_task_work(&self) -> usize {
        self.task_work.len()
    }

    /// Completions currently waiting on this ring's queue.
    pub fn cq_len(&self) -> usize {
        self.shared.cq().len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.shared.cq().overflow_count()
    }

    /// Tears the ring down, discarding unconsumed completions. Returns how many were discarded.
    pub fn destroy(mut self) -> usize {
        self.teardown()
    }

    fn teardown(&mut self) -> usize {
        let previous = self
            .shared
            .state
            .swap(RingState::Destroyed as u8, Ordering::AcqRel);
        if RingState::from_u8(previous) == RingState::Destroyed {
            return 0;
        }
        self.registry.remove(self.handle());
        // Let in-flight offloaded messages land before the queue closes.
        if let Some(mut worker) = self.offload.take() {
            worker.shutdown();
        }
        let discarded = self.task_work.len() + self.shared.cq().close();
        self.task_work.clear();
        debug!(ring = %self.handle(), discarded, "ring destroyed");
        discarded
    }

    fn issue(&mut self, sqe: Sqe) {
        let msg = match sqe {
            Sqe::Nop { user_data } => {
                self.complete_local(Cqe::new(user_data, 0));
                return;
            }
            Sqe::MsgRing(msg) => msg,
        };

        if !self.registry.capabilities().msg_ring {
            self.complete_local(Cqe::new(msg.user_data, -errno::EOPNOTSUPP));
            return;
        }

        let target = DeliveryEngine::new(&self.registry)
            .with_fixed_files(&self.files)
            .resolve(msg.target);

        let job = match &self.offload {
            Some(worker) => {
                let job = OffloadJob {
                    source: Arc::clone(&self.shared),
                    target,
                    msg,
                };
                match worker.dispatch(job) {
                    Ok(()) => return,
                    Err(job) => {
                        warn!(ring = %self.handle(), "offload worker gone; issuing inline");
                        job.target
                    }
                }
            }
            None => target,
        };

        let outcome = job.and_then(|target| deliver(&target, &msg));
        if let Some(cqe) = ack(&msg, &outcome) {
            self.complete_local(cqe);
        }
    }

    fn complete_local(&mut self, cqe: Cqe) {
        if self.flags.defer_taskrun {
            self.task_work.push(cqe);
        } else if self.shared.cq().push(cqe).is_err() {
            warn!(ring = %self.handle(), "local completion dropped: queue closed");
        }
    }

    fn check_open(&self, handle: Handle) -> RingResult<()> {
        if self.registry.is_open(handle) {
            Ok(())
        } else {
            Err(RingError::BadHandle(handle))
        }
    }

    fn check_can_submit(&self) -> RingResult<()> {
        if let Some(owner) = self.issuer {
            if owner != thread::current().id() {
                return Err(RingError::NotIssuer);
            }
        }
        if self.state() == RingState::Disabled {
            return Err(RingError::RingDisabled(self.handle()));
        }
        Ok(())
    }
}

impl Drop for RingInstance {
    fn drop(&mut self) {
        self.teardown();
    }
}
