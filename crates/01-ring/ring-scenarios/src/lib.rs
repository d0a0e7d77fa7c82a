#![allow(missing_docs)]

mod checks;
mod config;
mod context;
mod error;
mod rendezvous;
mod scenarios;
mod suite;

pub use checks::{expect_ack_and_event, expect_cqe, verify_exactly_once, CheckResult};
pub use config::{RingConfig, ScenarioKind, SuiteConfig};
pub use context::{Probe, ScenarioContext};
pub use error::{Outcome, ScenarioError, ScenarioResult};
pub use rendezvous::Rendezvous;
pub use scenarios::run_scenario;
pub use suite::{run_suite, Failure, SuiteReport, Verdict};
