//! Run events: a record of every observable decision the engine makes.
//!
//! Events are published by the controller and step executor through the
//! `RunEventSink` port and consumed by logging or UI adapters.

use std::path::PathBuf;

use crate::geometry::Point;
use crate::run::{StepOutcome, TerminationReason};
use crate::scenario::StepLocation;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A pass over the main sequence begins (1-based).
    LoopStarted { iteration: u32 },
    StepStarted {
        step: StepLocation,
        description: Option<String>,
    },
    /// A helper's trigger was visible and its tap was issued.
    HelperFired { name: String, at: Point },
    /// A step target was chosen and tapped.
    TargetTapped {
        step: StepLocation,
        target: PathBuf,
        at: Point,
    },
    /// The step's `loop_until_target` became visible.
    SentinelSeen { step: StepLocation },
    StepFinished {
        step: StepLocation,
        outcome: StepOutcome,
    },
    /// The global monitor's trigger was visible; the sub-flow starts.
    MonitorTriggered,
    SubFlowFinished {
        completed_steps: usize,
        aborted: bool,
        /// `None` when the sub-flow has no exit condition.
        exit_condition_met: Option<bool>,
    },
    LoopCompleted { completed_loops: u32 },
    Terminated {
        reason: TerminationReason,
        completed_loops: u32,
    },
}

impl RunEvent {
    /// Short machine-friendly name, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoopStarted { .. } => "loop_started",
            Self::StepStarted { .. } => "step_started",
            Self::HelperFired { .. } => "helper_fired",
            Self::TargetTapped { .. } => "target_tapped",
            Self::SentinelSeen { .. } => "sentinel_seen",
            Self::StepFinished { .. } => "step_finished",
            Self::MonitorTriggered => "monitor_triggered",
            Self::SubFlowFinished { .. } => "sub_flow_finished",
            Self::LoopCompleted { .. } => "loop_completed",
            Self::Terminated { .. } => "terminated",
        }
    }

    /// Events that mark a change in the run's course rather than routine
    /// per-attempt activity.
    #[must_use]
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::MonitorTriggered
                | Self::SubFlowFinished { .. }
                | Self::LoopCompleted { .. }
                | Self::Terminated { .. }
        )
    }
}
