//! Helper step: an always-armed trigger checked on every capture.
//!
//! Helpers dismiss interruptions (ads, confirmation popups) that can show up
//! in any step. A helper taps its trigger image and waits; it never changes
//! which step is active.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Seconds, TemplateProbe, check_image_path, check_threshold, default_threshold};
use crate::error::ValidationError;
use crate::geometry::Offset;

/// Legacy nested form `step: { post_delay: ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelperAction {
    #[serde(default)]
    pub post_delay: Option<Seconds>,
}

/// A named trigger → tap pair evaluated independently of the active step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperStep {
    pub trigger_image: PathBuf,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub post_delay: Option<Seconds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<HelperAction>,
}

impl HelperStep {
    #[must_use]
    pub fn new(trigger_image: impl Into<PathBuf>) -> Self {
        Self {
            trigger_image: trigger_image.into(),
            threshold: default_threshold(),
            offset: Offset::default(),
            post_delay: None,
            step: None,
        }
    }

    #[must_use]
    pub fn probe(&self) -> TemplateProbe<'_> {
        TemplateProbe {
            path: &self.trigger_image,
            threshold: self.threshold,
        }
    }

    fn configured_delay(&self) -> Option<Seconds> {
        self.post_delay
            .or_else(|| self.step.as_ref().and_then(|s| s.post_delay))
    }

    /// Pause after the helper's tap; the top-level field wins over the nested one.
    #[must_use]
    pub fn post_delay(&self) -> Duration {
        self.configured_delay()
            .unwrap_or(Seconds(1.0))
            .as_duration()
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), ValidationError> {
        let field = format!("helper_steps.{name}");
        check_image_path(field.as_str(), &self.trigger_image)?;
        check_threshold(field.as_str(), self.threshold)?;
        if let Some(delay) = self.configured_delay() {
            delay.check(format!("{field}.post_delay"))?;
        }
        Ok(())
    }
}
