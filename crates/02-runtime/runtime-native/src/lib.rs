#![deny(missing_docs)]
//! Native process runner for the ring message conformance suite.

mod config;

use ring_fabric::Registry;
use ring_scenarios::{run_suite, SuiteReport, Verdict};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub use config::{
    parse_caps, ConfigError, RunnerConfig, CAPS_VAR, CONFIGS_VAR, SCENARIOS_VAR,
};

/// Installs the `fmt` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore error if already set (e.g., during tests).
    let _ = fmt().with_env_filter(env_filter).try_init();
}

/// Runs the suite on a fresh registry built from `config`.
pub fn run(config: &RunnerConfig) -> SuiteReport {
    info!(caps = ?config.caps, "starting conformance run");
    let registry = Registry::new(config.caps);
    run_suite(&registry, &config.suite)
}

/// Maps command-line arguments and configuration to a verdict.
///
/// The runner takes no arguments; any argument yields [`Verdict::Skip`]
/// before configuration is read or anything runs.
pub fn run_with_args<I, S>(
    args: I,
    load: impl FnOnce() -> Result<RunnerConfig, ConfigError>,
) -> Result<Verdict, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(arg) = args.into_iter().next() {
        info!(arg = arg.as_ref(), "arguments are not supported; skipping");
        return Ok(Verdict::Skip);
    }
    let config = load()?;
    Ok(run(&config).verdict)
}
