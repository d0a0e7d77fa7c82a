use ring_fabric::SetupFlags;

/// Ring setup a suite pass runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingConfig {
    pub name: &'static str,
    pub flags: SetupFlags,
}

impl RingConfig {
    pub const DEFAULT: RingConfig = RingConfig {
        name: "default",
        flags: SetupFlags {
            r_disabled: false,
            single_issuer: false,
            defer_taskrun: false,
            offload: false,
        },
    };

    pub const DEFER_TASKRUN: RingConfig = RingConfig {
        name: "defer-taskrun",
        flags: SetupFlags::defer_taskrun(),
    };

    pub const OFFLOAD: RingConfig = RingConfig {
        name: "offload",
        flags: SetupFlags::offload(),
    };

    /// Every configuration the suite knows, in run order.
    pub fn matrix() -> Vec<RingConfig> {
        vec![Self::DEFAULT, Self::DEFER_TASKRUN, Self::OFFLOAD]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::matrix().into_iter().find(|config| config.name == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    LoopbackDeferred,
    LoopbackSync,
    RemoteDeferred,
    RemoteSync,
    RemoteSubmit,
    InvalidHandle,
    InvalidFixed,
    DisabledTarget,
    DestroyedTarget,
    ConcurrentSenders,
    SubmissionQueueFull,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 11] = [
        ScenarioKind::LoopbackDeferred,
        ScenarioKind::LoopbackSync,
        ScenarioKind::InvalidHandle,
        ScenarioKind::InvalidFixed,
        ScenarioKind::RemoteDeferred,
        ScenarioKind::RemoteSync,
        ScenarioKind::RemoteSubmit,
        ScenarioKind::DisabledTarget,
        ScenarioKind::DestroyedTarget,
        ScenarioKind::ConcurrentSenders,
        ScenarioKind::SubmissionQueueFull,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::LoopbackDeferred => "loopback-deferred",
            ScenarioKind::LoopbackSync => "loopback-sync",
            ScenarioKind::RemoteDeferred => "remote-deferred",
            ScenarioKind::RemoteSync => "remote-sync",
            ScenarioKind::RemoteSubmit => "remote-submit",
            ScenarioKind::InvalidHandle => "invalid-handle",
            ScenarioKind::InvalidFixed => "invalid-fixed",
            ScenarioKind::DisabledTarget => "disabled-target",
            ScenarioKind::DestroyedTarget => "destroyed-target",
            ScenarioKind::ConcurrentSenders => "concurrent-senders",
            ScenarioKind::SubmissionQueueFull => "sq-full",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// What a suite run covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuiteConfig {
    pub configs: Vec<RingConfig>,
    pub scenarios: Vec<ScenarioKind>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            configs: RingConfig::matrix(),
            scenarios: ScenarioKind::ALL.to_vec(),
        }
    }
}
