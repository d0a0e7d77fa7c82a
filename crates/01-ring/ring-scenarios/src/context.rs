//! Capability probe and the per-configuration scenario context.
//!
//! The probe runs once per suite by actually using each feature, and its
//! result is handed to every scenario through [`ScenarioContext`].

use std::sync::Arc;

use ring_fabric::{
    is_unsupported_result, MessageSubmission, Registry, RingError, RingInstance, RingResult,
    SetupFlags,
};
use tracing::debug;

use crate::checks::expect_cqe;
use crate::config::RingConfig;
use crate::error::ScenarioError;

const PROBE_ACK: u64 = 0xfeed;
const PROBE_TAG: u64 = 0x1234;
const PROBE_PAYLOAD: u32 = 0x10;

/// What the platform turned out to support.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    pub msg_ring: bool,
    pub sync_msg: bool,
    pub defer_taskrun: bool,
    pub disabled_rings: bool,
}

impl Probe {
    /// Exercises each feature once and records whether it is available.
    pub fn detect(registry: &Arc<Registry>) -> Result<Self, ScenarioError> {
        let mut ring = RingInstance::new(registry, 8, SetupFlags::default())?;
        let msg_ring = probe_deferred(&mut ring)?;
        let sync_msg = msg_ring && probe_sync(&mut ring)?;
        let defer_taskrun = probe_setup(registry, SetupFlags::defer_taskrun())?;
        let disabled_rings = probe_setup(registry, SetupFlags::default().disabled())?;
        let probe = Self {
            msg_ring,
            sync_msg,
            defer_taskrun,
            disabled_rings,
        };
        debug!(?probe, "capability probe finished");
        Ok(probe)
    }

    /// Whether rings can be built with `config`.
    pub fn supports(&self, config: &RingConfig) -> bool {
        (!config.flags.defer_taskrun || self.defer_taskrun)
            && (!config.flags.r_disabled || self.disabled_rings)
    }
}

/// First deferred use: an unsupported result on the ack means no messaging at all.
fn probe_deferred(ring: &mut RingInstance) -> Result<bool, ScenarioError> {
    let msg =
        MessageSubmission::to_handle(ring.handle(), PROBE_PAYLOAD, PROBE_TAG).with_user_data(PROBE_ACK);
    ring.post_message(msg)?;
    let mut remaining = 2;
    while remaining > 0 {
        let cqe = ring.wait_one()?;
        remaining -= 1;
        if cqe.user_data == PROBE_ACK {
            if is_unsupported_result(cqe.res) {
                return Ok(false);
            }
            expect_cqe(&cqe, PROBE_ACK, 0)?;
        } else {
            expect_cqe(&cqe, PROBE_TAG, PROBE_PAYLOAD as i32)?;
        }
    }
    Ok(true)
}

fn probe_sync(ring: &mut RingInstance) -> Result<bool, ScenarioError> {
    let msg =
        MessageSubmission::to_handle(ring.handle(), PROBE_PAYLOAD, PROBE_TAG).synchronous();
    match ring.post_message(msg) {
        Ok(_) => {
            let cqe = ring.wait_one()?;
            expect_cqe(&cqe, PROBE_TAG, PROBE_PAYLOAD as i32)?;
            Ok(true)
        }
        Err(err) if err.is_unsupported() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn probe_setup(registry: &Arc<Registry>, flags: SetupFlags) -> Result<bool, ScenarioError> {
    match RingInstance::new(registry, 8, flags) {
        Ok(_) => Ok(true),
        Err(RingError::InvalidArgument(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Everything a scenario needs: the shared registry, the ring setup under
/// test, and the probe result.
#[derive(Clone)]
pub struct ScenarioContext {
    pub registry: Arc<Registry>,
    pub config: RingConfig,
    pub probe: Probe,
}

impl ScenarioContext {
    pub fn new(registry: Arc<Registry>, config: RingConfig, probe: Probe) -> Self {
        Self {
            registry,
            config,
            probe,
        }
    }

    /// Creates a ring with the configuration under test.
    pub fn ring(&self, entries: u32) -> RingResult<RingInstance> {
        RingInstance::new(&self.registry, entries, self.config.flags)
    }

    /// Same as [`ScenarioContext::ring`] but starting `Disabled`.
    pub fn disabled_ring(&self, entries: u32) -> RingResult<RingInstance> {
        RingInstance::new(&self.registry, entries, self.config.flags.disabled())
    }
}
