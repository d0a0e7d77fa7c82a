//! Environment-driven runner configuration.

use ring_fabric::Capabilities;
use ring_scenarios::{RingConfig, ScenarioKind, SuiteConfig};
use thiserror::Error;

/// Comma-separated capability tokens to switch off (`no-msg-ring`, ...).
pub const CAPS_VAR: &str = "MSG_RING_CAPS";
/// Comma-separated scenario names to run instead of the full list.
pub const SCENARIOS_VAR: &str = "MSG_RING_SCENARIOS";
/// Comma-separated ring configuration names to run instead of the full matrix.
pub const CONFIGS_VAR: &str = "MSG_RING_CONFIGS";

/// Errors raised while reading runner configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A capability token was not recognised.
    #[error("{CAPS_VAR}: unknown capability token `{0}`")]
    UnknownCapability(String),
    /// A scenario name was not recognised.
    #[error("{SCENARIOS_VAR}: unknown scenario `{0}`")]
    UnknownScenario(String),
    /// A ring configuration name was not recognised.
    #[error("{CONFIGS_VAR}: unknown ring configuration `{0}`")]
    UnknownConfig(String),
    /// A selection list named nothing.
    #[error("{0}: empty selection")]
    EmptySelection(&'static str),
}

/// What a runner invocation covers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Capabilities of the simulated platform.
    pub caps: Capabilities,
    /// Scenarios and ring configurations to run.
    pub suite: SuiteConfig,
}

impl RunnerConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| std::env::var(name).ok();
        Self::from_vars(
            var(CAPS_VAR).as_deref(),
            var(SCENARIOS_VAR).as_deref(),
            var(CONFIGS_VAR).as_deref(),
        )
    }

    /// Builds a configuration from raw variable values; `None` keeps the default.
    pub fn from_vars(
        caps: Option<&str>,
        scenarios: Option<&str>,
        configs: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = caps {
            config.caps = parse_caps(raw)?;
        }
        if let Some(raw) = scenarios {
            config.suite.scenarios = parse_list(raw, SCENARIOS_VAR, |name| {
                ScenarioKind::from_name(name)
                    .ok_or_else(|| ConfigError::UnknownScenario(name.to_owned()))
            })?;
        }
        if let Some(raw) = configs {
            config.suite.configs = parse_list(raw, CONFIGS_VAR, |name| {
                RingConfig::from_name(name)
                    .ok_or_else(|| ConfigError::UnknownConfig(name.to_owned()))
            })?;
        }
        Ok(config)
    }
}

/// Parses a `MSG_RING_CAPS` value. An empty value keeps every capability.
pub fn parse_caps(raw: &str) -> Result<Capabilities, ConfigError> {
    let mut caps = Capabilities::default();
    for token in tokens(raw) {
        match token {
            "no-msg-ring" => caps.msg_ring = false,
            "no-sync-msg" => caps.sync_msg = false,
            "no-defer-taskrun" => caps.defer_taskrun = false,
            "no-disabled-rings" => caps.disabled_rings = false,
            other => return Err(ConfigError::UnknownCapability(other.to_owned())),
        }
    }
    Ok(caps)
}

fn parse_list<T>(
    raw: &str,
    var: &'static str,
    parse: impl Fn(&str) -> Result<T, ConfigError>,
) -> Result<Vec<T>, ConfigError> {
    let items = tokens(raw).map(parse).collect::<Result<Vec<_>, _>>()?;
    if items.is_empty() {
        return Err(ConfigError::EmptySelection(var));
    }
    Ok(items)
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|token| !token.is_empty())
}
