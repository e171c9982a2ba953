//! # tapflow-app
//!
//! Application layer: the automation engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `DeviceControl`: capture a screen frame, tap a point
//!   - `RunEventSink`: receive run events
//! - Cache decoded templates (`TemplateStore`) and locate them in frames
//!   (`Matcher`)
//! - Answer visibility questions with a fresh capture (`ConditionEvaluator`)
//! - Drive one step to completion (`StepExecutor`) and a whole scenario
//!   through its state machine (`AutomationController`)
//! - Provide **in-process infrastructure** (run-event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `tapflow-domain` only (plus `image` for pixel buffers and
//! `tokio` for timers, channels and cancellation).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

mod cancel;
pub mod condition;
pub mod controller;
pub mod event_bus;
pub mod frame;
pub mod matcher;
pub mod ports;
pub mod step_executor;
pub mod template_store;

#[cfg(test)]
pub(crate) mod testing;
