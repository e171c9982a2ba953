//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`TapflowError`]
//! when crossing a port boundary.

use crate::scenario::StepLocation;

/// Base error for the tapflow workspace.
#[derive(Debug, thiserror::Error)]
pub enum TapflowError {
    /// The scenario violates a domain invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The device-control collaborator failed (capture, tap, connect).
    #[error("device error: {0}")]
    Device(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Scenario invariant violations, reported before any device interaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("scenario has no steps")]
    NoSteps,

    #[error("global monitor sub-flow has no steps")]
    EmptySubFlow,

    #[error("{0} has no targets and no loop_until_target")]
    NoTargets(StepLocation),

    #[error("adb_path must not be empty")]
    EmptyAdbPath,

    #[error("{field} has an empty image path")]
    EmptyImagePath { field: String },

    #[error("{field} threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange { field: String, value: f64 },

    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDuration { field: String, value: f64 },

    #[error("loop.times must be at least 1")]
    ZeroLoopTimes,
}
