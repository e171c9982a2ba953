//! Loop policy: how many passes over the main sequence a run makes.

use serde::{Deserialize, Serialize};

use super::ExitCondition;
use crate::error::ValidationError;

/// Bounded or unbounded repetition, as written in the scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    #[default]
    Times,
    Infinite,
}

fn default_times() -> u32 {
    1
}

/// The `loop` section of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "type")]
    pub kind: LoopKind,
    #[serde(default = "default_times")]
    pub times: u32,
    /// Stops the main sequence as soon as it is visible before a step.
    #[serde(default)]
    pub exit_condition: Option<ExitCondition>,
}

/// Resolved repetition budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Looping disabled: one pass.
    Once,
    /// A fixed number of passes.
    Times(u32),
    /// Loop until stopped by an exit condition, a failure or cancellation.
    Infinite,
}

impl LoopPolicy {
    /// Whether `completed` passes use up the budget.
    #[must_use]
    pub fn is_exhausted(self, completed: u32) -> bool {
        match self {
            Self::Once => completed >= 1,
            Self::Times(n) => completed >= n,
            Self::Infinite => false,
        }
    }
}

impl LoopConfig {
    #[must_use]
    pub fn policy(&self) -> LoopPolicy {
        match (self.enabled, self.kind) {
            (false, _) => LoopPolicy::Once,
            (true, LoopKind::Times) => LoopPolicy::Times(self.times),
            (true, LoopKind::Infinite) => LoopPolicy::Infinite,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.kind == LoopKind::Times && self.times == 0 {
            return Err(ValidationError::ZeroLoopTimes);
        }
        if let Some(exit) = &self.exit_condition {
            exit.validate("loop.exit_condition")?;
        }
        Ok(())
    }
}
