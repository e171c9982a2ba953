//! Step: one scripted UI state and the candidate targets that advance it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    Seconds, StepLocation, TemplateProbe, check_image_path, check_threshold, default_threshold,
    prefix_image_path,
};
use crate::error::ValidationError;
use crate::geometry::Offset;

/// How a step picks among several visible targets.
///
/// Written in scenario files as the boolean `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum SelectionMode {
    /// Evaluate every target and tap the highest priority one.
    #[default]
    Priority,
    /// Tap the first target, in declaration order, that is visible.
    FirstFound,
}

impl From<bool> for SelectionMode {
    fn from(any: bool) -> Self {
        if any { Self::FirstFound } else { Self::Priority }
    }
}

impl From<SelectionMode> for bool {
    fn from(mode: SelectionMode) -> Self {
        matches!(mode, SelectionMode::FirstFound)
    }
}

/// A candidate landmark for the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub path: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Added to the match center before tapping.
    #[serde(default)]
    pub offset: Offset,
    /// Higher wins in [`SelectionMode::Priority`].
    #[serde(default)]
    pub priority: i32,
}

impl Target {
    /// A target at the default threshold, no offset, priority 0.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold: default_threshold(),
            offset: Offset::default(),
            priority: 0,
        }
    }

    #[must_use]
    pub fn probe(&self) -> TemplateProbe<'_> {
        TemplateProbe {
            path: &self.path,
            threshold: self.threshold,
        }
    }

    /// File name of the template, used in log lines.
    #[must_use]
    pub fn name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

fn default_timeout() -> Seconds {
    Seconds(60.0)
}

fn default_post_delay() -> Seconds {
    Seconds(1.0)
}

/// One step of a scripted sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default, rename = "any")]
    pub selection: SelectionMode,
    /// Sentinel image: when set, the step keeps tapping until it appears.
    #[serde(default)]
    pub loop_until_target: Option<PathBuf>,
    #[serde(default = "default_threshold")]
    pub loop_until_threshold: f64,
    /// Give up when no target has been seen for this long.
    #[serde(default = "default_timeout")]
    pub timeout: Seconds,
    /// Pause after each tap.
    #[serde(default = "default_post_delay")]
    pub post_delay: Seconds,
}

impl Step {
    /// Create a step with default timing around the given targets.
    #[must_use]
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            description: None,
            targets,
            selection: SelectionMode::default(),
            loop_until_target: None,
            loop_until_threshold: default_threshold(),
            timeout: default_timeout(),
            post_delay: default_post_delay(),
        }
    }

    /// The sentinel probe, if this step loops until an image appears.
    #[must_use]
    pub fn sentinel(&self) -> Option<TemplateProbe<'_>> {
        self.loop_until_target
            .as_deref()
            .map(|path| TemplateProbe {
                path,
                threshold: self.loop_until_threshold,
            })
    }

    /// Human-readable label for logs.
    #[must_use]
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or("<unnamed>")
    }

    pub(crate) fn validate(&self, location: StepLocation) -> Result<(), ValidationError> {
        if self.targets.is_empty() && self.loop_until_target.is_none() {
            return Err(ValidationError::NoTargets(location));
        }
        for (i, target) in self.targets.iter().enumerate() {
            let field = format!("{location} target {}", i + 1);
            check_image_path(field.as_str(), &target.path)?;
            check_threshold(field, target.threshold)?;
        }
        if let Some(sentinel) = &self.loop_until_target {
            check_image_path(format!("{location} loop_until_target"), sentinel)?;
            check_threshold(
                format!("{location} loop_until_target"),
                self.loop_until_threshold,
            )?;
        }
        self.timeout.check(format!("{location} timeout"))?;
        self.post_delay.check(format!("{location} post_delay"))
    }

    pub(crate) fn resolve_image_paths(&mut self, root: &Path) {
        for target in &mut self.targets {
            prefix_image_path(&mut target.path, root);
        }
        if let Some(sentinel) = &mut self.loop_until_target {
            prefix_image_path(sentinel, root);
        }
    }
}
