use thiserror::Error;

use ring_fabric::RingError;

pub type ScenarioResult = Result<Outcome, ScenarioError>;

/// How a scenario ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// The platform lacks something the scenario needs.
    Skipped(&'static str),
}

/// Scenario failures. Check failures mean a broken delivery contract; ring
/// errors are engine calls that failed where success was required.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("check failed: {0}")]
    Check(String),

    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("rendezvous aborted: {0}")]
    Aborted(&'static str),

    #[error("scenario thread panicked: {0}")]
    Panicked(&'static str),

    #[error("failed to spawn scenario thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<String> for ScenarioError {
    fn from(msg: String) -> Self {
        ScenarioError::Check(msg)
    }
}
