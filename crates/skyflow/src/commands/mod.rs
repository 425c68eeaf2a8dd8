pub mod apply;
pub mod graph;
pub mod plan;
pub mod refresh;
pub mod state;
pub mod validate;

use std::process::ExitCode;

/// How a command finished, mapped onto the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Some steps were applied and others failed or never ran
    PartialFailure,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::PartialFailure => ExitCode::from(2),
        }
    }
}
