//! # tapflow-domain
//!
//! Pure scenario model for the tapflow screen automation engine.
//!
//! ## Responsibilities
//! - Foundational types: pixel geometry, error conventions
//! - Define **Scenarios** (device settings, ordered steps, loop policy)
//! - Define **Steps** and their **Targets** (template + threshold + offset + priority)
//! - Define **Helper steps** (always-armed trigger/tap pairs)
//! - Define **Exit conditions** and the **Global monitor** with its sub-flow
//! - Enforce invariants once, at load time, and normalize image paths
//! - Describe run results: step outcomes, termination reasons, run events
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod event;
pub mod geometry;
pub mod run;
pub mod scenario;
