//! Two-phase thread rendezvous used by the cross-thread scenarios.
//!
//! Phase one (startup) is released once the thread owning the target ring has
//! published its value; phase two (action) is released once every sender has
//! prepared its submission. A participant that fails before the action phase
//! marks the rendezvous aborted instead of skipping the barrier, so nobody is
//! left parked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

use parking_lot::Mutex;

pub struct Rendezvous<T> {
    startup: Barrier,
    action: Barrier,
    published: Mutex<Option<T>>,
    aborted: AtomicBool,
}

impl<T: Clone> Rendezvous<T> {
    /// Creates a rendezvous for `parties` threads, the caller included.
    pub fn new(parties: usize) -> Self {
        Self {
            startup: Barrier::new(parties),
            action: Barrier::new(parties),
            published: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    /// Publishes `value` and joins the startup barrier.
    pub fn publish(&self, value: T) {
        *self.published.lock() = Some(value);
        self.startup.wait();
    }

    /// Joins the startup barrier without publishing; waiters see `None` and
    /// skip the action phase.
    pub fn withdraw(&self) {
        self.abort();
        self.startup.wait();
    }

    /// Joins the startup barrier and returns what was published, if anything.
    pub fn await_published(&self) -> Option<T> {
        self.startup.wait();
        self.published.lock().clone()
    }

    /// Joins the action barrier. Returns `false` if any party aborted.
    pub fn act(&self) -> bool {
        self.action.wait();
        !self.is_aborted()
    }

    /// Marks the rendezvous failed; the caller must still call [`Rendezvous::act`].
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}
