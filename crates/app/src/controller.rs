//! Automation controller: the state machine that drives a whole scenario.
//!
//! ```text
//!            monitor trigger visible
//!   ┌──────────────┐ ─────────────────▶ ┌─────────┐
//!   │ MainSequence │                    │ SubFlow │
//!   └──────────────┘ ◀───────────────── └─────────┘
//!          │           cursor reset to 0      │
//!          │ exit condition / step failure /  │ cancellation
//!          │ loop budget / cancellation       │
//!          ▼                                  ▼
//!   ┌────────────────────────────────────────────┐
//!   │                 Terminated                 │
//!   └────────────────────────────────────────────┘
//! ```
//!
//! Before every main-sequence step the controller captures a fresh frame for
//! the global monitor trigger and another for the exit condition. The
//! sub-flow runs its steps back to back without either check.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tapflow_domain::event::RunEvent;
use tapflow_domain::run::{RunReport, StepOutcome, TerminationReason};
use tapflow_domain::scenario::{GlobalMonitor, LoopPolicy, Scenario, StepLocation, TemplateProbe};

use crate::cancel::unless_cancelled;
use crate::condition::ConditionEvaluator;
use crate::matcher::Matcher;
use crate::ports::{DeviceControl, RunEventSink};
use crate::step_executor::StepExecutor;
use crate::template_store::TemplateStore;

#[derive(Debug)]
enum State {
    MainSequence { cursor: usize },
    SubFlow,
    Terminated(TerminationReason),
}

/// Drives a validated [`Scenario`] against a device until it terminates.
pub struct AutomationController<D, S> {
    scenario: Arc<Scenario>,
    matcher: Matcher,
    device: D,
    sink: S,
    cancel: CancellationToken,
}

impl<D, S> AutomationController<D, S>
where
    D: DeviceControl,
    S: RunEventSink,
{
    /// Create a controller for an already validated, path-resolved scenario.
    pub fn new(scenario: Arc<Scenario>, templates: Arc<TemplateStore>, device: D, sink: S) -> Self {
        Self {
            scenario,
            matcher: Matcher::new(templates),
            device,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that stops the run at its next suspension point.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the scenario to completion.
    ///
    /// Never fails: every way a run can end is a [`TerminationReason`].
    #[tracing::instrument(skip(self), fields(steps = self.scenario.steps.len()))]
    pub async fn run(&self) -> RunReport {
        let policy = self.scenario.loop_policy();
        let executor = StepExecutor::new(&self.device, &self.matcher, &self.sink, &self.cancel)
            .with_helpers(&self.scenario.helper_steps)
            .with_check_interval(self.scenario.check_interval.as_duration());
        let mut completed_loops = 0_u32;
        let mut state = State::MainSequence { cursor: 0 };

        tracing::info!(?policy, "run started");
        self.sink.publish(RunEvent::LoopStarted { iteration: 1 }).await;

        let reason = loop {
            state = match state {
                State::Terminated(reason) => break reason,
                State::SubFlow => self.run_sub_flow(&executor).await,
                State::MainSequence { cursor } => {
                    self.main_tick(&executor, cursor, policy, &mut completed_loops)
                        .await
                }
            };
        };

        tracing::info!(%reason, completed_loops, "run terminated");
        self.sink
            .publish(RunEvent::Terminated {
                reason: reason.clone(),
                completed_loops,
            })
            .await;
        RunReport {
            completed_loops,
            reason,
        }
    }

    async fn main_tick(
        &self,
        executor: &StepExecutor<'_, D, S>,
        cursor: usize,
        policy: LoopPolicy,
        completed_loops: &mut u32,
    ) -> State {
        if self.cancel.is_cancelled() {
            return State::Terminated(TerminationReason::Cancelled);
        }

        if let Some(monitor) = &self.scenario.global_monitor {
            match self.is_visible(monitor.probe()).await {
                None => return State::Terminated(TerminationReason::Cancelled),
                Some(true) => {
                    tracing::info!(
                        trigger = %monitor.trigger_image.display(),
                        "global monitor triggered"
                    );
                    self.sink.publish(RunEvent::MonitorTriggered).await;
                    return State::SubFlow;
                }
                Some(false) => {}
            }
        }

        if let Some(exit) = self.scenario.exit_condition() {
            match self.is_visible(exit.probe()).await {
                None => return State::Terminated(TerminationReason::Cancelled),
                Some(true) => {
                    tracing::info!(target = %exit.target.display(), "exit condition met");
                    return State::Terminated(TerminationReason::ExitConditionMet);
                }
                Some(false) => {}
            }
        }

        let Some(step) = self.scenario.steps.get(cursor) else {
            return State::MainSequence { cursor: 0 };
        };
        let location = StepLocation::Main(cursor + 1);
        match executor.run(location, step).await {
            StepOutcome::Cancelled => return State::Terminated(TerminationReason::Cancelled),
            StepOutcome::TimedOut => {
                return State::Terminated(TerminationReason::StepFailed {
                    step: location,
                    description: step.description.clone(),
                });
            }
            StepOutcome::Completed => {}
        }

        let next = cursor + 1;
        if next < self.scenario.steps.len() {
            return State::MainSequence { cursor: next };
        }

        *completed_loops += 1;
        tracing::info!(completed_loops = *completed_loops, "loop completed");
        self.sink
            .publish(RunEvent::LoopCompleted {
                completed_loops: *completed_loops,
            })
            .await;
        if policy.is_exhausted(*completed_loops) {
            return State::Terminated(TerminationReason::LoopBudgetExhausted);
        }
        self.sink
            .publish(RunEvent::LoopStarted {
                iteration: *completed_loops + 1,
            })
            .await;
        State::MainSequence { cursor: 0 }
    }

    /// Run the monitor's sub-flow once, then hand control back to the main
    /// sequence from its first step.
    async fn run_sub_flow(&self, executor: &StepExecutor<'_, D, S>) -> State {
        let Some(GlobalMonitor { target_loop, .. }) = &self.scenario.global_monitor else {
            return State::MainSequence { cursor: 0 };
        };

        let mut completed_steps = 0;
        let mut aborted = false;
        for (i, step) in target_loop.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return State::Terminated(TerminationReason::Cancelled);
            }
            match executor.run(StepLocation::SubFlow(i + 1), step).await {
                StepOutcome::Completed => completed_steps += 1,
                StepOutcome::Cancelled => return State::Terminated(TerminationReason::Cancelled),
                StepOutcome::TimedOut => {
                    tracing::warn!(step = i + 1, "sub-flow step failed; skipping the rest");
                    aborted = true;
                    break;
                }
            }
        }

        let exit_condition_met = match &target_loop.exit_condition {
            None => None,
            Some(exit) => match self.is_visible(exit.probe()).await {
                None => return State::Terminated(TerminationReason::Cancelled),
                Some(met) => Some(met),
            },
        };

        // The main sequence resumes whether or not the exit condition held.
        tracing::info!(
            completed_steps,
            aborted,
            ?exit_condition_met,
            "sub-flow finished; resuming main sequence"
        );
        self.sink
            .publish(RunEvent::SubFlowFinished {
                completed_steps,
                aborted,
                exit_condition_met,
            })
            .await;
        State::MainSequence { cursor: 0 }
    }

    /// `None` when cancelled during the capture.
    async fn is_visible(&self, probe: TemplateProbe<'_>) -> Option<bool> {
        let evaluator = ConditionEvaluator::new(&self.device, &self.matcher);
        unless_cancelled(&self.cancel, evaluator.evaluate(probe)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use image::GrayImage;
    use tokio::time::Instant;

    use crate::testing::{ScriptedDevice, SpySink, center_of, scene, texture};

    fn scenario(json: serde_json::Value) -> Arc<Scenario> {
        let scenario: Scenario = serde_json::from_value(json).unwrap();
        scenario.validate().unwrap();
        Arc::new(scenario)
    }

    fn store(templates: &[(&str, &GrayImage)]) -> Arc<TemplateStore> {
        let mut store = TemplateStore::new();
        for (path, image) in templates {
            store.insert(*path, (*image).clone());
        }
        Arc::new(store)
    }

    fn make_controller(
        scenario: Arc<Scenario>,
        templates: Arc<TemplateStore>,
        device: &Arc<ScriptedDevice>,
        sink: &Arc<SpySink>,
    ) -> AutomationController<Arc<ScriptedDevice>, Arc<SpySink>> {
        AutomationController::new(scenario, templates, Arc::clone(device), Arc::clone(sink))
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_step_that_never_matches() {
        let ok = texture(1, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"description": "open menu", "targets": [{"path": "ok.png", "threshold": 0.8}], "timeout": 5}]
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, store(&[("ok.png", &ok)]), &device, &sink);
        let started = Instant::now();

        let report = controller.run().await;

        assert_eq!(report.completed_loops, 0);
        assert_eq!(
            report.reason,
            TerminationReason::StepFailed {
                step: StepLocation::Main(1),
                description: Some("open menu".to_string()),
            }
        );
        assert!(!report.is_success());
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() <= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_exactly_the_loop_budget() {
        let ok = texture(1, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}],
            "loop": {"enabled": true, "type": "times", "times": 3}
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[(&ok, 5, 5)])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, store(&[("ok.png", &ok)]), &device, &sink);

        let report = controller.run().await;

        assert_eq!(report.completed_loops, 3);
        assert_eq!(report.reason, TerminationReason::LoopBudgetExhausted);
        assert_eq!(device.taps().len(), 3);
        let loops: Vec<u32> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                RunEvent::LoopCompleted { completed_loops } => Some(*completed_loops),
                _ => None,
            })
            .collect();
        assert_eq!(loops, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_once_without_loop_section() {
        let ok = texture(1, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}, {"targets": [{"path": "ok.png"}]}]
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[(&ok, 5, 5)])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, store(&[("ok.png", &ok)]), &device, &sink);

        let report = controller.run().await;

        assert_eq!(report.completed_loops, 1);
        assert_eq!(report.reason, TerminationReason::LoopBudgetExhausted);
        assert_eq!(device.taps().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_when_exit_condition_visible() {
        let ok = texture(1, 10, 10);
        let done = texture(2, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}],
            "loop": {"enabled": true, "type": "infinite", "exit_condition": {"target": "done.png"}}
        }));
        // Per step: exit check, then step capture.
        let device = Arc::new(
            ScriptedDevice::showing(scene(&[(&done, 40, 40)]))
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)]))
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)])),
        );
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(
            scenario,
            store(&[("ok.png", &ok), ("done.png", &done)]),
            &device,
            &sink,
        );

        let report = controller.run().await;

        assert_eq!(report.reason, TerminationReason::ExitConditionMet);
        assert_eq!(report.completed_loops, 2);
        assert_eq!(device.taps().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_divert_to_sub_flow_and_resume_from_first_step() {
        let ok = texture(1, 10, 10);
        let popup = texture(2, 12, 12);
        let dismiss = texture(3, 8, 8);
        let gone = texture(4, 8, 8);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}],
            "loop": {"enabled": true, "times": 2},
            "global_monitor": {
                "trigger_image": "popup.png",
                "target_loop": {
                    "steps": [{"targets": [{"path": "dismiss.png"}]}],
                    "exit_condition": {"target": "gone.png"}
                }
            }
        }));
        let device = Arc::new(
            ScriptedDevice::showing(scene(&[]))
                // loop 1: monitor check, step
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)]))
                // loop 2: monitor fires
                .then(scene(&[(&popup, 20, 20)]))
                // sub-flow step, then its exit condition (not met)
                .then(scene(&[(&dismiss, 40, 8)]))
                .then(scene(&[]))
                // back at cursor 0: monitor check, step
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)])),
        );
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(
            scenario,
            store(&[
                ("ok.png", &ok),
                ("popup.png", &popup),
                ("dismiss.png", &dismiss),
                ("gone.png", &gone),
            ]),
            &device,
            &sink,
        );

        let report = controller.run().await;

        assert_eq!(report.completed_loops, 2);
        assert_eq!(report.reason, TerminationReason::LoopBudgetExhausted);
        assert_eq!(
            device.taps(),
            vec![
                center_of(&ok, 5, 5),
                center_of(&dismiss, 40, 8),
                center_of(&ok, 5, 5),
            ]
        );
        let events = sink.events();
        assert!(events.contains(&RunEvent::MonitorTriggered));
        assert!(events.contains(&RunEvent::SubFlowFinished {
            completed_steps: 1,
            aborted: false,
            exit_condition_met: Some(false),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn should_resume_from_first_step_even_when_sub_flow_exit_is_met() {
        let ok = texture(1, 10, 10);
        let next = texture(5, 10, 10);
        let popup = texture(2, 12, 12);
        let dismiss = texture(3, 8, 8);
        let gone = texture(4, 8, 8);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [
                {"targets": [{"path": "ok.png"}]},
                {"targets": [{"path": "next.png"}]}
            ],
            "loop": {"enabled": true, "times": 1},
            "global_monitor": {
                "trigger_image": "popup.png",
                "target_loop": {
                    "steps": [{"targets": [{"path": "dismiss.png"}]}],
                    "exit_condition": {"target": "gone.png"}
                }
            }
        }));
        let device = Arc::new(
            ScriptedDevice::showing(scene(&[]))
                // cursor 0: monitor check, step 1
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)]))
                // cursor 1: monitor fires before step 2
                .then(scene(&[(&popup, 20, 20)]))
                // sub-flow step, then its exit condition (met)
                .then(scene(&[(&dismiss, 40, 8)]))
                .then(scene(&[(&gone, 40, 40)]))
                // back at cursor 0: step 1 again, then step 2
                .then(scene(&[]))
                .then(scene(&[(&ok, 5, 5)]))
                .then(scene(&[]))
                .then(scene(&[(&next, 30, 30)])),
        );
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(
            scenario,
            store(&[
                ("ok.png", &ok),
                ("next.png", &next),
                ("popup.png", &popup),
                ("dismiss.png", &dismiss),
                ("gone.png", &gone),
            ]),
            &device,
            &sink,
        );

        let report = controller.run().await;

        assert_eq!(report.reason, TerminationReason::LoopBudgetExhausted);
        assert_eq!(report.completed_loops, 1);
        assert_eq!(
            device.taps(),
            vec![
                center_of(&ok, 5, 5),
                center_of(&dismiss, 40, 8),
                center_of(&ok, 5, 5),
                center_of(&next, 30, 30),
            ]
        );
        let events = sink.events();
        let finished = events
            .iter()
            .position(|e| {
                *e == RunEvent::SubFlowFinished {
                    completed_steps: 1,
                    aborted: false,
                    exit_condition_met: Some(true),
                }
            })
            .unwrap();
        assert!(matches!(
            &events[finished + 1],
            RunEvent::StepStarted {
                step: StepLocation::Main(1),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_freeze_loop_counter_when_later_loop_fails() {
        let ok = texture(1, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"description": "collect", "targets": [{"path": "ok.png"}], "timeout": 3}],
            "loop": {"enabled": true, "type": "times", "times": 5}
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[])).then(scene(&[(&ok, 5, 5)])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, store(&[("ok.png", &ok)]), &device, &sink);

        let report = controller.run().await;

        assert_eq!(report.completed_loops, 1);
        assert_eq!(
            report.reason,
            TerminationReason::StepFailed {
                step: StepLocation::Main(1),
                description: Some("collect".to_string()),
            }
        );
        assert_eq!(device.taps(), vec![center_of(&ok, 5, 5)]);
        assert_eq!(
            sink.events().last(),
            Some(&RunEvent::Terminated {
                reason: report.reason.clone(),
                completed_loops: 1,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_abort_sub_flow_on_failed_step() {
        let ok = texture(1, 10, 10);
        let popup = texture(2, 12, 12);
        let second = texture(3, 8, 8);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}],
            "global_monitor": {
                "trigger_image": "popup.png",
                "target_loop": {"steps": [
                    {"targets": [{"path": "missing.png"}], "timeout": 1},
                    {"targets": [{"path": "second.png"}]}
                ]}
            }
        }));
        let device = Arc::new(
            ScriptedDevice::showing(scene(&[(&ok, 5, 5)]))
                .then(scene(&[(&popup, 20, 20)]))
                .then(scene(&[(&second, 40, 40)]))
                .then(scene(&[(&second, 40, 40)]))
                .then(scene(&[(&second, 40, 40)])),
        );
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(
            scenario,
            store(&[("ok.png", &ok), ("popup.png", &popup), ("second.png", &second)]),
            &device,
            &sink,
        );

        let report = controller.run().await;

        assert_eq!(report.reason, TerminationReason::LoopBudgetExhausted);
        assert_eq!(device.taps(), vec![center_of(&ok, 5, 5)]);
        assert!(sink.events().contains(&RunEvent::SubFlowFinished {
            completed_steps: 0,
            aborted: true,
            exit_condition_met: None,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn should_terminate_when_cancelled_mid_step() {
        let ok = texture(1, 10, 10);
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}], "timeout": 600}],
            "loop": {"enabled": true, "type": "infinite"}
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, store(&[("ok.png", &ok)]), &device, &sink);
        let token = controller.cancellation_token();

        let cancel = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            token.cancel();
        };
        let (report, ()) = tokio::join!(controller.run(), cancel);

        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert_eq!(report.completed_loops, 0);
        assert!(report.is_success());
        assert_eq!(
            sink.events().last(),
            Some(&RunEvent::Terminated {
                reason: TerminationReason::Cancelled,
                completed_loops: 0,
            })
        );
    }

    #[tokio::test]
    async fn should_not_touch_device_when_cancelled_before_start() {
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "ok.png"}]}]
        }));
        let device = Arc::new(ScriptedDevice::showing(scene(&[])));
        let sink = Arc::new(SpySink::default());
        let token = CancellationToken::new();
        token.cancel();
        let controller = make_controller(scenario, store(&[]), &device, &sink)
            .with_cancellation(token);

        let report = controller.run().await;

        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert_eq!(device.captures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_never_match_unloadable_template() {
        let scenario = scenario(serde_json::json!({
            "adb_path": "adb",
            "steps": [{"targets": [{"path": "/nonexistent/ok.png"}], "timeout": 3}]
        }));
        let templates = Arc::new(TemplateStore::preload(&scenario));
        let device = Arc::new(ScriptedDevice::showing(scene(&[(&texture(1, 10, 10), 5, 5)])));
        let sink = Arc::new(SpySink::default());
        let controller = make_controller(scenario, templates, &device, &sink);

        let report = controller.run().await;

        assert!(report.reason.is_failure());
        assert!(device.taps().is_empty());
    }
}
