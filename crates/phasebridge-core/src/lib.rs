//! Simulation clock, task scheduler, and step loop for PhaseBridge.
//!
//! This crate owns the step cycle that keeps the coordinator in lockstep
//! with the external simulation engine: step the engine, sync the clock,
//! turn inbound records into tasks, run due tasks, publish what they
//! produce.
//!
//! # Modules
//!
//! - [`clock`] -- Monotonic simulated time and per-step memoization.
//! - [`config`] -- Configuration loading from `phasebridge-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- Shared stop, pacing, and time-limit state for a running session.
//! - [`dispatch`] -- [`TaskFactory`] registry mapping record types to tasks.
//! - [`engine`] -- [`SignalEngine`] port and the in-memory
//!   [`FixedTimeEngine`].
//! - [`inbox`] -- Bounded per-record-type inbound queues.
//! - [`runner`] -- The session loop with start gate and time limit.
//! - [`scheduler`] -- Cyclic and one-shot task heaps.
//! - [`sink`] -- [`RecordSink`] destinations for outbound records.
//! - [`step`] -- The per-step cycle.
//! - [`task`] -- Schedulable actions and their outcomes.
//!
//! [`TaskFactory`]: dispatch::TaskFactory
//! [`SignalEngine`]: engine::SignalEngine
//! [`FixedTimeEngine`]: engine::FixedTimeEngine
//! [`RecordSink`]: sink::RecordSink

pub mod clock;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod inbox;
pub mod runner;
pub mod scheduler;
pub mod sink;
pub mod step;
pub mod task;
