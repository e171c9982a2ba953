//! Scenario: the scripted sequence of UI states the engine drives through.
//!
//! A [`Scenario`] is loaded once, validated once with
//! [`validate`](Scenario::validate), has its image paths normalized with
//! [`resolve_image_paths`](Scenario::resolve_image_paths), and is then
//! treated as immutable for the whole run.

mod device;
mod helper;
mod loop_policy;
mod monitor;
mod step;

pub use device::DeviceSettings;
pub use helper::{HelperAction, HelperStep};
pub use loop_policy::{LoopConfig, LoopKind, LoopPolicy};
pub use monitor::{GlobalMonitor, SubFlow};
pub use step::{SelectionMode, Step, Target};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Threshold used whenever a scenario file omits one.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Directory under which relative template paths are resolved by default.
pub const DEFAULT_IMAGE_ROOT: &str = "image";

pub(crate) fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// A non-negative duration written as (fractional) seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seconds(pub f64);

impl Seconds {
    /// Convert to a [`Duration`].
    ///
    /// Values too large for a `Duration` saturate to [`Duration::MAX`];
    /// negative and NaN values collapse to zero.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        match Duration::try_from_secs_f64(self.0) {
            Ok(duration) => duration,
            Err(_) if self.0 > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

    fn check(self, field: impl Into<String>) -> Result<(), ValidationError> {
        if self.0.is_finite() && self.0 >= 0.0 {
            Ok(())
        } else {
            Err(ValidationError::InvalidDuration {
                field: field.into(),
                value: self.0,
            })
        }
    }
}

/// Where in the scenario a step lives, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLocation {
    /// 1-based position in the main sequence.
    Main(usize),
    /// 1-based position in the global monitor's sub-flow.
    SubFlow(usize),
}

impl std::fmt::Display for StepLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main(n) => write!(f, "step {n}"),
            Self::SubFlow(n) => write!(f, "sub-flow step {n}"),
        }
    }
}

/// A template path paired with the similarity it must reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateProbe<'a> {
    pub path: &'a Path,
    pub threshold: f64,
}

/// A template that, when visible, means "stop".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCondition {
    pub target: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl ExitCondition {
    #[must_use]
    pub fn probe(&self) -> TemplateProbe<'_> {
        TemplateProbe {
            path: &self.target,
            threshold: self.threshold,
        }
    }

    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        check_image_path(field, &self.target)?;
        check_threshold(field, self.threshold)
    }
}

fn default_check_interval() -> Seconds {
    Seconds(2.0)
}

/// The complete, validated input of one automation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(flatten)]
    pub device: DeviceSettings,
    /// Pause between capture attempts while waiting for a step's targets.
    #[serde(default = "default_check_interval")]
    pub check_interval: Seconds,
    pub steps: Vec<Step>,
    /// Popup handlers, fired in declaration order.
    #[serde(default)]
    pub helper_steps: IndexMap<String, HelperStep>,
    #[serde(default, rename = "loop")]
    pub loop_config: Option<LoopConfig>,
    #[serde(default)]
    pub global_monitor: Option<GlobalMonitor>,
}

impl Scenario {
    /// How many passes over the main sequence are allowed.
    #[must_use]
    pub fn loop_policy(&self) -> LoopPolicy {
        self.loop_config
            .as_ref()
            .map_or(LoopPolicy::Once, LoopConfig::policy)
    }

    /// The main-sequence exit condition, if one is configured.
    #[must_use]
    pub fn exit_condition(&self) -> Option<&ExitCondition> {
        self.loop_config
            .as_ref()
            .and_then(|l| l.exit_condition.as_ref())
    }

    /// Check every domain invariant.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, in declaration order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.device.validate()?;
        self.check_interval.check("check_interval")?;

        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate(StepLocation::Main(i + 1))?;
        }
        for (name, helper) in &self.helper_steps {
            helper.validate(name)?;
        }
        if let Some(loop_config) = &self.loop_config {
            loop_config.validate()?;
        }
        if let Some(monitor) = &self.global_monitor {
            monitor.validate()?;
        }
        Ok(())
    }

    /// Rewrite every relative template path so that it lives under `root`.
    ///
    /// Absolute paths and paths already starting with `root` are left alone.
    /// Must be applied exactly once, right after loading.
    pub fn resolve_image_paths(&mut self, root: &Path) {
        for step in &mut self.steps {
            step.resolve_image_paths(root);
        }
        for helper in self.helper_steps.values_mut() {
            prefix_image_path(&mut helper.trigger_image, root);
        }
        if let Some(exit) = self.loop_config.as_mut().and_then(|l| l.exit_condition.as_mut()) {
            prefix_image_path(&mut exit.target, root);
        }
        if let Some(monitor) = &mut self.global_monitor {
            monitor.resolve_image_paths(root);
        }
    }

    /// Every distinct template path referenced anywhere in the scenario.
    #[must_use]
    pub fn image_paths(&self) -> BTreeSet<&Path> {
        let mut paths = BTreeSet::new();
        let steps = self
            .steps
            .iter()
            .chain(self.global_monitor.iter().flat_map(|m| &m.target_loop.steps));
        for step in steps {
            paths.extend(step.targets.iter().map(|t| t.path.as_path()));
            paths.extend(step.loop_until_target.as_deref());
        }
        paths.extend(self.helper_steps.values().map(|h| h.trigger_image.as_path()));
        paths.extend(self.exit_condition().map(|c| c.target.as_path()));
        if let Some(monitor) = &self.global_monitor {
            paths.insert(monitor.trigger_image.as_path());
            paths.extend(
                monitor
                    .target_loop
                    .exit_condition
                    .as_ref()
                    .map(|c| c.target.as_path()),
            );
        }
        paths
    }
}

/// Join `root` in front of a relative `path`.
///
/// The "already under `root`" test compares whole path components, so
/// `imagery/x.png` is not considered to live under `image`.
pub(crate) fn prefix_image_path(path: &mut PathBuf, root: &Path) {
    if path.as_os_str().is_empty() || path.is_absolute() || path.starts_with(root) {
        return;
    }
    *path = root.join(&*path);
}

pub(crate) fn check_threshold(field: impl Into<String>, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::ThresholdOutOfRange {
            field: field.into(),
            value,
        })
    }
}

pub(crate) fn check_image_path(field: impl Into<String>, path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        Err(ValidationError::EmptyImagePath {
            field: field.into(),
        })
    } else {
        Ok(())
    }
}
