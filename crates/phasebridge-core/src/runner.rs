//! Session loop runner with run controls.
//!
//! [`run_session`] drives [`Session::run_step`] until a termination
//! condition is met:
//!
//! - **Start gate**: optionally wait for a `Start` record before stepping
//! - **Time limit**: stop once simulated time reaches the configured limit
//! - **Pacing**: optional real-time pause between steps
//! - **Stop**: clean stop on request
//!
//! Whatever the outcome, the session is reset on exit so no task outlives
//! it.

use std::sync::Arc;

use phasebridge_types::RecordType;
use tracing::{info, warn};

use crate::control::{SessionControl, SessionEndReason};
use crate::engine::SignalEngine;
use crate::step::{Session, StepError, StepSummary};

/// Errors that can occur during the session run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A step failed fatally.
    #[error("step error: {source}")]
    Step {
        /// The underlying step error.
        #[from]
        source: StepError,
    },
}

/// Result of a session run.
#[derive(Debug)]
pub struct SessionResult {
    /// The reason the session ended.
    pub end_reason: SessionEndReason,
    /// The last step summary, if any step completed.
    pub final_summary: Option<StepSummary>,
    /// Total number of steps executed.
    pub total_steps: u64,
}

/// Callback invoked after each step completes.
pub trait StepCallback: Send {
    /// Called after a step completes successfully.
    fn on_step(&mut self, summary: &StepSummary);
}

/// A no-op step callback.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_step(&mut self, _summary: &StepSummary) {}
}

/// Run the session loop until a termination condition is met.
///
/// When `await_start` is set, no step runs before a `Start` record arrives
/// in the inbox.
///
/// # Errors
///
/// Returns [`RunnerError`] if a step fails fatally. The session is reset
/// in that case too.
pub async fn run_session(
    session: &mut Session,
    engine: &mut dyn SignalEngine,
    control: &Arc<SessionControl>,
    await_start: bool,
    callback: &mut dyn StepCallback,
) -> Result<SessionResult, RunnerError> {
    info!(
        time_limit = ?control.time_limit(),
        step_interval_ms = control.step_interval_ms(),
        await_start,
        "Session starting"
    );

    let result = drive(session, engine, control, await_start, callback).await;
    session.reset();

    let result = result?;
    control.set_end_reason(result.end_reason).await;
    Ok(result)
}

async fn drive(
    session: &mut Session,
    engine: &mut dyn SignalEngine,
    control: &SessionControl,
    await_start: bool,
    callback: &mut dyn StepCallback,
) -> Result<SessionResult, RunnerError> {
    let mut last_summary: Option<StepSummary> = None;
    let mut total_steps: u64 = 0;

    // --- Start gate ---
    if await_start {
        info!("Waiting for start order");
        tokio::select! {
            record = session.inbox_mut().recv(RecordType::Start) => {
                if record.is_none() {
                    warn!("Inbound channel closed before start order");
                    return Ok(SessionResult {
                        end_reason: SessionEndReason::InboundClosed,
                        final_summary: None,
                        total_steps,
                    });
                }
                info!("Start order received");
            }
            () = control.stopped() => {}
        }
    }

    loop {
        // --- Check stop request (before step) ---
        if control.is_stop_requested() {
            info!("Stop requested");
            return Ok(SessionResult {
                end_reason: SessionEndReason::StopRequested,
                final_summary: last_summary,
                total_steps,
            });
        }

        // --- Check time limit (before step) ---
        let now = session.clock().now();
        if control.time_limit_reached(now) {
            info!(%now, limit = ?control.time_limit(), "Time limit reached");
            return Ok(SessionResult {
                end_reason: SessionEndReason::TimeLimitReached,
                final_summary: last_summary,
                total_steps,
            });
        }

        // --- Execute step ---
        let summary = session.run_step(engine)?;
        total_steps = total_steps.saturating_add(1);

        callback.on_step(&summary);
        last_summary = Some(summary);

        // --- Sleep for step interval ---
        let interval_ms = control.step_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        } else {
            // Let the inbound receiver run between steps.
            tokio::task::yield_now().await;
        }
    }
}

/// Log the session end sequence.
pub fn log_session_end(result: &SessionResult) {
    info!(
        reason = ?result.end_reason,
        total_steps = result.total_steps,
        final_step = result.final_summary.as_ref().map(|s| s.step),
        final_time = ?result.final_summary.as_ref().map(|s| s.time),
        "Session ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            step = summary.step,
            time = %summary.time,
            records_published = summary.records_published,
            task_failures = summary.task_failures,
            "Final step summary"
        );
    } else {
        warn!("Session ended with no steps executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasebridge_types::{
        InboundRecord, OutboundRecord, ProgramId, ProgramLogic, RawSubphase, SignalState, SimTime,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::dispatch::TaskFactoryRegistry;
    use crate::engine::{EngineError, FixedTimeEngine};
    use crate::inbox::{Inbox, InboxSender};
    use crate::sink::MemorySink;
    use crate::task::{Task, TaskContext, TaskError, TaskOutcome};

    fn engine() -> FixedTimeEngine {
        let mut engine = FixedTimeEngine::new(dec!(1)).unwrap();
        engine
            .add_traffic_light(
                "J1",
                ProgramLogic {
                    program_id: ProgramId(0),
                    subphases: vec![RawSubphase::new(SignalState::all_red(1), dec!(10))],
                },
            )
            .unwrap();
        engine
    }

    fn session() -> (Session, InboxSender, MemorySink) {
        let (tx, inbox) = Inbox::channel(8);
        let sink = MemorySink::new();
        let session = Session::new(
            inbox,
            TaskFactoryRegistry::new(),
            Arc::new(sink.clone()),
            SimTime::ZERO,
        );
        (session, tx, sink)
    }

    fn reporter() -> Task {
        Task::cyclic(
            "reporter",
            None,
            dec!(1),
            |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                let record = OutboundRecord::encode(RecordType::SignalExecution, ctx.now, &"heartbeat")?;
                Ok(TaskOutcome::produced(record))
            },
        )
    }

    fn limited(limit: Decimal) -> Arc<SessionControl> {
        Arc::new(SessionControl::with_limits(0, Some(SimTime::from_secs(limit))))
    }

    #[tokio::test]
    async fn bounded_by_time_limit() {
        let mut engine = engine();
        let (mut session, _tx, sink) = session();
        session.add_task(reporter()).unwrap();
        let control = limited(dec!(5));

        let result = run_session(&mut session, &mut engine, &control, false, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SessionEndReason::TimeLimitReached);
        assert_eq!(result.total_steps, 5);
        assert_eq!(sink.take().len(), 5);
        assert_eq!(control.end_reason().await, Some(SessionEndReason::TimeLimitReached));
    }

    #[tokio::test]
    async fn stop_before_first_step() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session();
        let control = Arc::new(SessionControl::with_limits(0, None));
        control.request_stop();

        let result = run_session(&mut session, &mut engine, &control, false, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SessionEndReason::StopRequested);
        assert_eq!(result.total_steps, 0);
    }

    #[tokio::test]
    async fn session_is_reset_on_exit() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session();
        session.add_task(reporter()).unwrap();
        let control = limited(dec!(2));

        run_session(&mut session, &mut engine, &control, false, &mut NoOpCallback)
            .await
            .unwrap();

        assert!(session.scheduler().is_empty());
        assert_eq!(session.clock().step(), 0);
    }

    #[tokio::test]
    async fn waits_for_start_order() {
        let mut engine = engine();
        let (mut session, tx, _sink) = session();
        let control = limited(dec!(3));
        tx.push(InboundRecord {
            record_type: RecordType::Start,
            payload: json!({}),
        });

        let result = run_session(&mut session, &mut engine, &control, true, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SessionEndReason::TimeLimitReached);
        assert_eq!(result.total_steps, 3);
    }

    #[tokio::test]
    async fn closed_inbound_ends_gated_session() {
        let mut engine = engine();
        let (mut session, tx, _sink) = session();
        drop(tx);
        let control = limited(dec!(3));

        let result = run_session(&mut session, &mut engine, &control, true, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SessionEndReason::InboundClosed);
        assert_eq!(result.total_steps, 0);
    }

    #[tokio::test]
    async fn stop_releases_start_gate() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session();
        let control = Arc::new(SessionControl::with_limits(0, None));
        let stopper = Arc::clone(&control);
        tokio::spawn(async move { stopper.request_stop() });

        let result = run_session(&mut session, &mut engine, &control, true, &mut NoOpCallback)
            .await
            .unwrap();

        assert_eq!(result.end_reason, SessionEndReason::StopRequested);
        assert_eq!(result.total_steps, 0);
    }

    #[tokio::test]
    async fn step_callback_is_called() {
        struct CountCallback {
            count: u64,
        }
        impl StepCallback for CountCallback {
            fn on_step(&mut self, _summary: &StepSummary) {
                self.count = self.count.saturating_add(1);
            }
        }

        let mut engine = engine();
        let (mut session, _tx, _sink) = session();
        let control = limited(dec!(3));
        let mut cb = CountCallback { count: 0 };

        run_session(&mut session, &mut engine, &control, false, &mut cb)
            .await
            .unwrap();

        assert_eq!(cb.count, 3);
    }

    #[tokio::test]
    async fn fatal_task_error_ends_session() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session();
        session
            .add_task(Task::one_shot(
                "broken",
                None,
                |_ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                    Err(EngineError::UnknownTrafficLight {
                        tls_id: "J9".to_owned(),
                    }
                    .into())
                },
            ))
            .unwrap();
        let control = limited(dec!(3));

        let result =
            run_session(&mut session, &mut engine, &control, false, &mut NoOpCallback).await;

        assert!(matches!(result, Err(RunnerError::Step { .. })));
        assert!(session.scheduler().is_empty());
    }
}
