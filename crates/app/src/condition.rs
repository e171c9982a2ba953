//! Condition evaluator: "is this template on screen right now?".

use tapflow_domain::scenario::TemplateProbe;

use crate::matcher::Matcher;
use crate::ports::DeviceControl;

/// Answers visibility questions against a fresh capture.
///
/// Used for the loop exit condition, the sub-flow exit condition and the
/// global monitor trigger.
pub struct ConditionEvaluator<'a, D> {
    device: &'a D,
    matcher: &'a Matcher,
}

impl<'a, D: DeviceControl> ConditionEvaluator<'a, D> {
    #[must_use]
    pub fn new(device: &'a D, matcher: &'a Matcher) -> Self {
        Self { device, matcher }
    }

    /// Capture a frame and report whether `probe` is visible in it.
    ///
    /// A failed capture counts as "not visible".
    pub async fn evaluate(&self, probe: TemplateProbe<'_>) -> bool {
        match self.device.capture_screen().await {
            Ok(frame) => self.matcher.find(&frame, probe).is_some(),
            Err(err) => {
                tracing::debug!(
                    template = %probe.path.display(),
                    error = %err,
                    "screen capture failed while evaluating condition"
                );
                false
            }
        }
    }
}
