//! Runs the ring message conformance suite. Exit codes: 0 pass, 1 fail, 77 skip.

use anyhow::{Context, Result};
use ring_scenarios::Verdict;
use runtime_native::{init_tracing, run_with_args, RunnerConfig};
use tracing::error;

fn main() {
    init_tracing();
    let verdict = match try_main() {
        Ok(verdict) => verdict,
        Err(err) => {
            error!("{err:#}");
            Verdict::Fail
        }
    };
    std::process::exit(verdict.exit_code());
}

fn try_main() -> Result<Verdict> {
    run_with_args(std::env::args().skip(1), RunnerConfig::from_env)
        .context("invalid runner configuration")
}
