//! Run results: how a single step ended and why a whole run stopped.

use std::fmt;

use crate::scenario::StepLocation;

/// Result of driving one step to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A target was tapped (or the sentinel appeared).
    Completed,
    /// The step's timeout elapsed with nothing matching.
    TimedOut,
    /// The run was cancelled while the step was waiting.
    Cancelled,
}

impl StepOutcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed out",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Why the controller reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The main exit condition was visible before a step.
    ExitConditionMet,
    /// A main-sequence step timed out.
    StepFailed {
        step: StepLocation,
        description: Option<String>,
    },
    /// Cancellation was requested.
    Cancelled,
    /// The configured number of loops completed.
    LoopBudgetExhausted,
}

impl TerminationReason {
    /// Only a step failure counts as an unsuccessful run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StepFailed { .. })
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitConditionMet => f.write_str("exit condition met"),
            Self::StepFailed {
                step,
                description: Some(description),
            } => write!(f, "{step} ({description}) timed out"),
            Self::StepFailed {
                step,
                description: None,
            } => write!(f, "{step} timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::LoopBudgetExhausted => f.write_str("loop budget exhausted"),
        }
    }
}

/// Summary returned by a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Full passes over the main sequence.
    pub completed_loops: u32,
    pub reason: TerminationReason,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.reason.is_failure()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} completed loop(s)",
            self.reason, self.completed_loops
        )
    }
}
