//! Global monitor: an interrupt that suspends the main sequence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    ExitCondition, Step, StepLocation, TemplateProbe, check_image_path, check_threshold,
    default_threshold, prefix_image_path,
};
use crate::error::ValidationError;

/// Steps run once each time the global monitor fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubFlow {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub exit_condition: Option<ExitCondition>,
}

/// Trigger image plus the sub-flow it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMonitor {
    pub trigger_image: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub target_loop: SubFlow,
}

impl GlobalMonitor {
    #[must_use]
    pub fn probe(&self) -> TemplateProbe<'_> {
        TemplateProbe {
            path: &self.trigger_image,
            threshold: self.threshold,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check_image_path("global_monitor.trigger_image", &self.trigger_image)?;
        check_threshold("global_monitor", self.threshold)?;
        if self.target_loop.steps.is_empty() {
            return Err(ValidationError::EmptySubFlow);
        }
        for (i, step) in self.target_loop.steps.iter().enumerate() {
            step.validate(StepLocation::SubFlow(i + 1))?;
        }
        if let Some(exit) = &self.target_loop.exit_condition {
            exit.validate("global_monitor.target_loop.exit_condition")?;
        }
        Ok(())
    }

    pub(crate) fn resolve_image_paths(&mut self, root: &Path) {
        prefix_image_path(&mut self.trigger_image, root);
        for step in &mut self.target_loop.steps {
            step.resolve_image_paths(root);
        }
        if let Some(exit) = &mut self.target_loop.exit_condition {
            prefix_image_path(&mut exit.target, root);
        }
    }
}
