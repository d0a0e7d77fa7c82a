use std::sync::Arc;

use ring_fabric::Registry;
use tracing::{error, info, warn};

use crate::config::{RingConfig, ScenarioKind, SuiteConfig};
use crate::context::{Probe, ScenarioContext};
use crate::error::{Outcome, ScenarioError};
use crate::scenarios::run_scenario;

/// Process-level result of a suite run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Skip,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
            Verdict::Skip => 77,
        }
    }
}

/// A failed scenario and the configuration it failed under.
#[derive(Debug)]
pub struct Failure {
    pub config: &'static str,
    pub scenario: ScenarioKind,
    pub error: ScenarioError,
}

#[derive(Debug)]
pub struct SuiteReport {
    pub verdict: Verdict,
    pub probe: Option<Probe>,
    pub passed: usize,
    pub skipped: Vec<(&'static str, ScenarioKind, &'static str)>,
    pub skipped_configs: Vec<&'static str>,
    pub failure: Option<Failure>,
}

impl SuiteReport {
    fn new(probe: Option<Probe>) -> Self {
        Self {
            verdict: Verdict::Pass,
            probe,
            passed: 0,
            skipped: Vec::new(),
            skipped_configs: Vec::new(),
            failure: None,
        }
    }
}

/// Probes the platform once, then runs every selected scenario under every
/// supported configuration. Stops at the first failure.
pub fn run_suite(registry: &Arc<Registry>, config: &SuiteConfig) -> SuiteReport {
    let probe = match Probe::detect(registry) {
        Ok(probe) => probe,
        Err(err) => {
            error!(%err, "capability probe failed");
            let mut report = SuiteReport::new(None);
            report.verdict = Verdict::Fail;
            return report;
        }
    };
    let mut report = SuiteReport::new(Some(probe));
    if !probe.msg_ring {
        warn!("ring messages unsupported; skipping suite");
        report.verdict = Verdict::Skip;
        return report;
    }

    for ring_config in &config.configs {
        if !probe.supports(ring_config) {
            warn!(config = ring_config.name, "configuration unsupported; skipping");
            report.skipped_configs.push(ring_config.name);
            continue;
        }
        let ctx = ScenarioContext::new(Arc::clone(registry), *ring_config, probe);
        if let Err(failure) = run_config(&ctx, &config.scenarios, &mut report) {
            report.verdict = Verdict::Fail;
            report.failure = Some(failure);
            return report;
        }
    }

    info!(
        passed = report.passed,
        skipped = report.skipped.len(),
        "suite finished"
    );
    report
}

fn run_config(
    ctx: &ScenarioContext,
    scenarios: &[ScenarioKind],
    report: &mut SuiteReport,
) -> Result<(), Failure> {
    let RingConfig { name: config, .. } = ctx.config;
    for &scenario in scenarios {
        info!(config, scenario = scenario.name(), "scenario start");
        match run_scenario(scenario, ctx) {
            Ok(Outcome::Passed) => {
                info!(config, scenario = scenario.name(), "scenario passed");
                report.passed += 1;
            }
            Ok(Outcome::Skipped(reason)) => {
                warn!(config, scenario = scenario.name(), reason, "scenario skipped");
                report.skipped.push((config, scenario, reason));
            }
            Err(error) => {
                error!(config, scenario = scenario.name(), %error, "scenario failed");
                return Err(Failure {
                    config,
                    scenario,
                    error,
                });
            }
        }
    }
    Ok(())
}
