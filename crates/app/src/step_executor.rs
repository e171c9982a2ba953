//! Step executor: drives a single step until it completes, times out or
//! is cancelled.
//!
//! Each attempt captures one frame and, in order: fires every helper whose
//! trigger is visible, checks the step's sentinel, then picks and taps a
//! target. A step without a sentinel completes on its first tap; a step
//! with one keeps tapping until the sentinel shows up.

use std::time::Duration;

use indexmap::IndexMap;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tapflow_domain::event::RunEvent;
use tapflow_domain::geometry::Point;
use tapflow_domain::run::StepOutcome;
use tapflow_domain::scenario::{HelperStep, SelectionMode, Step, StepLocation, Target};

use crate::cancel::{pause, unless_cancelled};
use crate::frame::Frame;
use crate::matcher::Matcher;
use crate::ports::{DeviceControl, RunEventSink};

/// Pause between attempts when a scenario does not set `check_interval`.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// What a single attempt decided.
enum Attempt {
    Done(StepOutcome),
    /// A target was tapped but the sentinel is still pending.
    Tapped,
    /// Nothing usable on screen (or no screen at all).
    Idle,
}

/// Runs steps against a device.
///
/// Borrowed collaborators only; build one per run.
pub struct StepExecutor<'a, D, S> {
    device: &'a D,
    matcher: &'a Matcher,
    sink: &'a S,
    cancel: &'a CancellationToken,
    helpers: Option<&'a IndexMap<String, HelperStep>>,
    check_interval: Duration,
}

impl<'a, D, S> StepExecutor<'a, D, S>
where
    D: DeviceControl,
    S: RunEventSink,
{
    #[must_use]
    pub fn new(
        device: &'a D,
        matcher: &'a Matcher,
        sink: &'a S,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            device,
            matcher,
            sink,
            cancel,
            helpers: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Helpers evaluated on every captured frame, in declaration order.
    #[must_use]
    pub fn with_helpers(mut self, helpers: &'a IndexMap<String, HelperStep>) -> Self {
        self.helpers = Some(helpers);
        self
    }

    #[must_use]
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Drive `step` to a terminal [`StepOutcome`].
    #[tracing::instrument(skip(self, step), fields(description = step.label()))]
    pub async fn run(&self, location: StepLocation, step: &Step) -> StepOutcome {
        tracing::info!("step started");
        self.sink
            .publish(RunEvent::StepStarted {
                step: location,
                description: step.description.clone(),
            })
            .await;

        let outcome = self.drive(location, step).await;

        match outcome {
            StepOutcome::Completed => tracing::info!("step completed"),
            StepOutcome::TimedOut => tracing::warn!(
                timeout = ?step.timeout.as_duration(),
                "step timed out"
            ),
            StepOutcome::Cancelled => tracing::info!("step cancelled"),
        }
        self.sink
            .publish(RunEvent::StepFinished {
                step: location,
                outcome,
            })
            .await;
        outcome
    }

    async fn drive(&self, location: StepLocation, step: &Step) -> StepOutcome {
        let started = Instant::now();
        let timeout = step.timeout.as_duration();
        loop {
            if self.cancel.is_cancelled() {
                return StepOutcome::Cancelled;
            }
            match self.attempt(location, step).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Tapped => {}
                Attempt::Idle => {
                    if started.elapsed() > timeout {
                        return StepOutcome::TimedOut;
                    }
                    if !pause(self.cancel, self.check_interval).await {
                        return StepOutcome::Cancelled;
                    }
                }
            }
        }
    }

    async fn attempt(&self, location: StepLocation, step: &Step) -> Attempt {
        let Some(capture) = unless_cancelled(self.cancel, self.device.capture_screen()).await
        else {
            return Attempt::Done(StepOutcome::Cancelled);
        };
        let frame = match capture {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "screen capture failed");
                return Attempt::Idle;
            }
        };

        if !self.fire_helpers(&frame).await {
            return Attempt::Done(StepOutcome::Cancelled);
        }

        let sentinel = step.sentinel();
        if let Some(probe) = sentinel {
            if self.matcher.find(&frame, probe).is_some() {
                tracing::info!(sentinel = %probe.path.display(), "sentinel visible");
                self.sink
                    .publish(RunEvent::SentinelSeen { step: location })
                    .await;
                return Attempt::Done(StepOutcome::Completed);
            }
        }

        let Some((target, center)) = self.select_target(&frame, step) else {
            tracing::debug!("no target visible");
            return Attempt::Idle;
        };

        let at = center + target.offset;
        tracing::info!(
            target = %target.name(),
            priority = target.priority,
            %at,
            "tapping target"
        );
        if !self.tap(at).await {
            return Attempt::Done(StepOutcome::Cancelled);
        }
        self.sink
            .publish(RunEvent::TargetTapped {
                step: location,
                target: target.path.clone(),
                at,
            })
            .await;
        if !pause(self.cancel, step.post_delay.as_duration()).await {
            return Attempt::Done(StepOutcome::Cancelled);
        }

        if sentinel.is_some() {
            Attempt::Tapped
        } else {
            Attempt::Done(StepOutcome::Completed)
        }
    }

    /// Tap every helper whose trigger is visible in `frame`.
    ///
    /// Returns `false` if cancelled.
    async fn fire_helpers(&self, frame: &Frame) -> bool {
        for (name, helper) in self.helpers.into_iter().flatten() {
            let Some(center) = self.matcher.find(frame, helper.probe()) else {
                continue;
            };
            let at = center + helper.offset;
            tracing::info!(helper = %name, %at, "helper trigger visible");
            if !self.tap(at).await {
                return false;
            }
            self.sink
                .publish(RunEvent::HelperFired {
                    name: name.clone(),
                    at,
                })
                .await;
            if !pause(self.cancel, helper.post_delay()).await {
                return false;
            }
        }
        true
    }

    /// Pick the target to tap according to the step's selection mode.
    fn select_target<'s>(&self, frame: &Frame, step: &'s Step) -> Option<(&'s Target, Point)> {
        let mut visible = step
            .targets
            .iter()
            .filter_map(|target| Some((target, self.matcher.find(frame, target.probe())?)));
        match step.selection {
            SelectionMode::FirstFound => visible.next(),
            SelectionMode::Priority => visible.fold(None, |best, candidate| match best {
                Some((current, _)) if current.priority >= candidate.0.priority => best,
                _ => Some(candidate),
            }),
        }
    }

    /// Issue a tap without waiting on its result; returns `false` if cancelled.
    async fn tap(&self, at: Point) -> bool {
        match unless_cancelled(self.cancel, self.device.tap(at)).await {
            None => false,
            Some(Ok(())) => true,
            Some(Err(err)) => {
                tracing::warn!(%at, error = %err, "tap failed");
                true
            }
        }
    }
}
