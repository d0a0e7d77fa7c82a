//! Background worker for rings created with the `offload` flag.
//!
//! The owning thread resolves each message (so fixed indices are read on the
//! owner) and hands the resolved target to the worker, which appends the
//! target event and posts the local acknowledgement.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{trace, warn};

use crate::delivery::{ack, deliver};
use crate::error::{RingError, RingResult};
use crate::message::MessageSubmission;
use crate::registry::Handle;
use crate::ring::RingShared;

pub(crate) struct OffloadJob {
    pub(crate) source: Arc<RingShared>,
    pub(crate) target: RingResult<Arc<RingShared>>,
    pub(crate) msg: MessageSubmission,
}

impl OffloadJob {
    fn run(self) {
        let outcome = self
            .target
            .and_then(|target| deliver(&target, &self.msg));
        if let Some(cqe) = ack(&self.msg, &outcome) {
            if self.source.cq().push(cqe).is_err() {
                warn!(source = %self.source.handle(), "ack dropped: source ring closed");
            }
        }
    }
}

pub(crate) struct OffloadWorker {
    tx: Option<Sender<OffloadJob>>,
    thread: Option<JoinHandle<usize>>,
}

impl OffloadWorker {
    pub(crate) fn spawn(owner: Handle) -> RingResult<Self> {
        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name(format!("ring-offload-{}", owner.raw()))
            .spawn(move || run_worker(owner, rx))
            .map_err(|err| RingError::WorkerSpawn(err.to_string()))?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Hands a job to the worker; gives it back if the worker is gone.
    pub(crate) fn dispatch(&self, job: OffloadJob) -> Result<(), OffloadJob> {
        match &self.tx {
            Some(tx) => tx.send(job).map_err(|err| err.into_inner()),
            None => Err(job),
        }
    }

    /// Stops accepting work, lets queued jobs finish, and joins the thread.
    pub(crate) fn shutdown(&mut self) -> usize {
        drop(self.tx.take());
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(processed)) => processed,
            Some(Err(_)) => {
                warn!("offload worker panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for OffloadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(owner: Handle, rx: Receiver<OffloadJob>) -> usize {
    let mut processed = 0;
    for job in rx.iter() {
        job.run();
        processed += 1;
    }
    trace!(ring = %owner, processed, "offload worker exiting");
    processed
}
