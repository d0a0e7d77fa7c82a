//! Process-wide handle namespace shared by every ring.
//!
//! Handles name either a ring or some unrelated resource (stdio stand-ins and
//! anything opened through [`Registry::open_resource`]). Ring entries are held
//! weakly so the owning [`crate::RingInstance`] alone controls lifetime, and
//! handle numbers are never reused.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::delivery::DeliveryEngine;
use crate::error::{RingError, RingResult};
use crate::message::MessageSubmission;
use crate::ring::RingShared;

/// Opaque handle value naming a registered resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub const STDIN: Handle = Handle(0);
    pub const STDOUT: Handle = Handle(1);
    pub const STDERR: Handle = Handle(2);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the platform supports; degraded sets drive the SKIP paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Ring-to-ring messages at all.
    pub msg_ring: bool,
    /// The synchronous fast path.
    pub sync_msg: bool,
    /// Rings created with `defer_taskrun`.
    pub defer_taskrun: bool,
    /// Rings created with `r_disabled`.
    pub disabled_rings: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            msg_ring: true,
            sync_msg: true,
            defer_taskrun: true,
            disabled_rings: true,
        }
    }
}

enum Resource {
    Ring(Weak<RingShared>),
    Opaque(String),
}

pub struct Registry {
    caps: Capabilities,
    table: RwLock<HashMap<Handle, Resource>>,
    next_handle: AtomicU32,
}

impl Registry {
    /// Creates a registry with handles 0-2 pre-opened as stdio stand-ins.
    pub fn new(caps: Capabilities) -> Arc<Self> {
        let mut table = HashMap::new();
        for (handle, name) in [
            (Handle::STDIN, "stdin"),
            (Handle::STDOUT, "stdout"),
            (Handle::STDERR, "stderr"),
        ] {
            table.insert(handle, Resource::Opaque(name.to_owned()));
        }
        Arc::new(Self {
            caps,
            table: RwLock::new(table),
            next_handle: AtomicU32::new(3),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Opens a non-ring resource and returns its handle.
    pub fn open_resource(&self, name: impl Into<String>) -> Handle {
        let handle = self.allocate();
        self.table
            .write()
            .insert(handle, Resource::Opaque(name.into()));
        handle
    }

    /// Closes a resource opened with [`Registry::open_resource`].
    ///
    /// Rings are closed by destroying their [`crate::RingInstance`].
    pub fn close_resource(&self, handle: Handle) -> RingResult<()> {
        let mut table = self.table.write();
        match table.get(&handle) {
            None => Err(RingError::BadHandle(handle)),
            Some(Resource::Ring(_)) => Err(RingError::InvalidArgument(
                "ring handles are closed by destroying the ring",
            )),
            Some(Resource::Opaque(_)) => {
                table.remove(&handle);
                Ok(())
            }
        }
    }

    pub fn is_open(&self, handle: Handle) -> bool {
        self.table.read().contains_key(&handle)
    }

    /// Number of open handles, stdio stand-ins and live rings included.
    pub fn open_count(&self) -> usize {
        self.table
            .read()
            .values()
            .filter(|res| match res {
                Resource::Ring(weak) => weak.strong_count() > 0,
                Resource::Opaque(_) => true,
            })
            .count()
    }

    /// Number of live rings in the namespace.
    pub fn ring_count(&self) -> usize {
        self.table
            .read()
            .values()
            .filter(|res| matches!(res, Resource::Ring(weak) if weak.strong_count() > 0))
            .count()
    }

    /// Delivers a message synchronously without a source ring.
    ///
    /// Only handle addressing is meaningful here; fixed indices need a source
    /// ring's table and fail with [`RingError::InvalidArgument`].
    pub fn post_message_sync(&self, msg: &MessageSubmission) -> RingResult<()> {
        DeliveryEngine::new(self).post_sync(msg)
    }

    pub(crate) fn install_ring(
        &self,
        build: impl FnOnce(Handle) -> Arc<RingShared>,
    ) -> Arc<RingShared> {
        let handle = self.allocate();
        let shared = build(handle);
        self.table
            .write()
            .insert(handle, Resource::Ring(Arc::downgrade(&shared)));
        shared
    }

    pub(crate) fn remove(&self, handle: Handle) {
        self.table.write().remove(&handle);
    }

    /// Looks up a live ring; `None` for unknown handles, non-ring resources, and dead rings.
    pub(crate) fn resolve_ring(&self, handle: Handle) -> Option<Arc<RingShared>> {
        match self.table.read().get(&handle)? {
            Resource::Ring(weak) => weak.upgrade(),
            Resource::Opaque(_) => None,
        }
    }

    fn allocate(&self) -> Handle {
        Handle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}
