//! The per-step cycle that drives a session.
//!
//! Each call to [`Session::run_step`] runs these stages in order:
//!
//! 1. **Engine step** -- advance the simulation by one step.
//! 2. **Clock sync** -- mirror the engine's new time into the clock.
//! 3. **Inbox drain** -- take every record queued since the last step.
//! 4. **Dispatch** -- turn records into tasks through the factory registry
//!    and queue them.
//! 5. **Schedule** -- run every cyclic and one-shot task that is due.
//! 6. **Publish** -- hand produced records to the sink, unless the session
//!    is still warming up.
//!
//! The cycle is deterministic given the same engine and inbound records.

use std::sync::Arc;

use phasebridge_types::SimTime;
use tracing::{debug, info};

use crate::clock::{ClockError, SimulationClock};
use crate::dispatch::{FactoryContext, FactoryError, TaskFactoryRegistry};
use crate::engine::{EngineError, SignalEngine};
use crate::inbox::Inbox;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::sink::RecordSink;
use crate::task::Task;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The engine failed to step.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// The clock rejected the engine's time.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A task factory failed fatally.
    #[error("factory error: {source}")]
    Factory {
        /// The underlying factory error.
        #[from]
        source: FactoryError,
    },

    /// The scheduler or a task failed fatally.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },
}

/// Summary of a single step's execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSummary {
    /// The step number that was executed.
    pub step: u64,
    /// Simulated time after the step.
    pub time: SimTime,
    /// Inbound records drained this step.
    pub records_received: usize,
    /// Tasks created from inbound records.
    pub tasks_created: usize,
    /// Cyclic task runs.
    pub cyclic_runs: usize,
    /// One-shot task runs.
    pub single_runs: usize,
    /// Task runs that reported failure.
    pub task_failures: usize,
    /// Records handed to the sink.
    pub records_published: usize,
    /// Records withheld because the session was warming up.
    pub records_withheld: usize,
}

/// The mutable state of one simulation session.
pub struct Session {
    clock: SimulationClock,
    scheduler: Scheduler,
    inbox: Inbox,
    factories: TaskFactoryRegistry,
    sink: Arc<dyn RecordSink>,
    warm_up_until: SimTime,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler)
            .field("factories", &self.factories)
            .field("warm_up_until", &self.warm_up_until)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Assemble a session. Records produced before `warm_up_until` are not
    /// published.
    pub fn new(
        inbox: Inbox,
        factories: TaskFactoryRegistry,
        sink: Arc<dyn RecordSink>,
        warm_up_until: SimTime,
    ) -> Self {
        Self {
            clock: SimulationClock::new(),
            scheduler: Scheduler::new(),
            inbox,
            factories,
            sink,
            warm_up_until,
        }
    }

    /// Queue a task directly (periodic publishers, initial commands).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidCycleTime`] for a bad period.
    pub fn add_task(&mut self, task: Task) -> Result<(), SchedulerError> {
        self.scheduler.add_task(task)
    }

    /// The session clock.
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The task scheduler.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The inbound queues.
    pub const fn inbox_mut(&mut self) -> &mut Inbox {
        &mut self.inbox
    }

    /// Run one step of the session.
    ///
    /// # Errors
    ///
    /// Returns [`StepError`] if the engine, the clock, a factory, or a task
    /// fails fatally. The session should end.
    pub fn run_step(&mut self, engine: &mut dyn SignalEngine) -> Result<StepSummary, StepError> {
        // --- Engine step and clock sync ---
        engine.step()?;
        let step = self.clock.sync(engine.current_time())?;
        let now = self.clock.now();

        // --- Inbox drain and dispatch ---
        let records = self.inbox.drain();
        let mut tasks_created: usize = 0;
        {
            let ctx = FactoryContext {
                engine: &*engine,
                now,
            };
            for record in &records {
                if let Some(task) = self.factories.dispatch(record, &ctx)? {
                    debug!(label = task.label(), exec_time = ?task.exec_time(), "task created from record");
                    self.scheduler.add_task(task)?;
                    tasks_created = tasks_created.saturating_add(1);
                }
            }
        }

        // --- Schedule ---
        let report = self.scheduler.run_due(engine, now)?;

        // --- Publish ---
        let produced = report.records.len();
        let warming_up = now < self.warm_up_until;
        if !warming_up {
            for record in report.records {
                self.sink.publish(record);
            }
        }
        let (records_published, records_withheld) = if warming_up {
            (0, produced)
        } else {
            (produced, 0)
        };

        Ok(StepSummary {
            step,
            time: now,
            records_received: records.len(),
            tasks_created,
            cyclic_runs: report.cyclic_runs,
            single_runs: report.single_runs,
            task_failures: report.failures,
            records_published,
            records_withheld,
        })
    }

    /// End the session: drop every queued task and rewind the clock.
    /// Queued inbound records are discarded as well.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        let discarded = self.inbox.drain().len();
        self.clock.reset();
        info!(discarded, "session reset");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasebridge_types::{InboundRecord, OutboundRecord, ProgramId, ProgramLogic, RawSubphase, RecordType, SignalState};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::dispatch::decode;
    use crate::engine::FixedTimeEngine;
    use crate::inbox::InboxSender;
    use crate::sink::MemorySink;
    use crate::task::{TaskContext, TaskError, TaskOutcome};

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

    fn reporter(period: Decimal) -> Task {
        Task::cyclic(
            "reporter",
            None,
            period,
            |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                let record = OutboundRecord::encode(RecordType::SignalExecution, ctx.now, &"heartbeat")?;
                Ok(TaskOutcome::produced(record))
            },
        )
    }

    fn session(warm_up: Decimal) -> (Session, InboxSender, MemorySink) {
        let (tx, inbox) = Inbox::channel(8);
        let sink = MemorySink::new();
        let mut factories = TaskFactoryRegistry::new();
        factories.register(
            RecordType::SignalExecutionRequirement,
            |record: &InboundRecord, ctx: &FactoryContext<'_>| -> Result<Option<Task>, FactoryError> {
                let _: serde_json::Value = decode(record)?;
                Ok(Some(Task::one_shot(
                    "on-demand",
                    Some(ctx.now),
                    |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                        let record =
                            OutboundRecord::encode(RecordType::SignalScheme, ctx.now, &"scheme")?;
                        Ok(TaskOutcome::produced(record))
                    },
                )))
            },
        );
        let session = Session::new(
            inbox,
            factories,
            Arc::new(sink.clone()),
            SimTime::from_secs(warm_up),
        );
        (session, tx, sink)
    }

    #[test]
    fn step_advances_clock_with_engine() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session(dec!(0));
        let summary = session.run_step(&mut engine).unwrap();
        assert_eq!(summary.step, 1);
        assert_eq!(summary.time, SimTime::from_secs(dec!(1)));
        assert_eq!(session.clock().now(), engine.current_time());
    }

    #[test]
    fn periodic_records_are_published() {
        let mut engine = engine();
        let (mut session, _tx, sink) = session(dec!(0));
        session.add_task(reporter(dec!(2))).unwrap();
        for _ in 0..5 {
            session.run_step(&mut engine).unwrap();
        }
        // Runs at 1 (first drain), 3, 5.
        let times: Vec<SimTime> = sink.take().iter().map(|r| r.generated_at).collect();
        assert_eq!(
            times,
            vec![
                SimTime::from_secs(dec!(1)),
                SimTime::from_secs(dec!(3)),
                SimTime::from_secs(dec!(5)),
            ]
        );
    }

    #[test]
    fn inbound_record_creates_and_runs_task() {
        let mut engine = engine();
        let (mut session, tx, sink) = session(dec!(0));
        assert!(tx.push(InboundRecord {
            record_type: RecordType::SignalExecutionRequirement,
            payload: json!({}),
        }));
        let summary = session.run_step(&mut engine).unwrap();
        assert_eq!(summary.records_received, 1);
        assert_eq!(summary.tasks_created, 1);
        assert_eq!(summary.single_runs, 1);
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn records_without_factory_are_dropped() {
        let mut engine = engine();
        let (mut session, tx, _sink) = session(dec!(0));
        tx.push(InboundRecord {
            record_type: RecordType::SpeedGuide,
            payload: json!({}),
        });
        let summary = session.run_step(&mut engine).unwrap();
        assert_eq!(summary.records_received, 1);
        assert_eq!(summary.tasks_created, 0);
    }

    #[test]
    fn nothing_is_published_during_warm_up() {
        let mut engine = engine();
        let (mut session, _tx, sink) = session(dec!(3));
        session.add_task(reporter(dec!(1))).unwrap();
        let mut withheld = 0;
        for _ in 0..4 {
            withheld += session.run_step(&mut engine).unwrap().records_withheld;
        }
        assert_eq!(withheld, 2);
        let times: Vec<SimTime> = sink.take().iter().map(|r| r.generated_at).collect();
        assert_eq!(
            times,
            vec![SimTime::from_secs(dec!(3)), SimTime::from_secs(dec!(4))]
        );
    }

    #[test]
    fn reset_clears_tasks_and_clock() {
        let mut engine = engine();
        let (mut session, _tx, _sink) = session(dec!(0));
        session.add_task(reporter(dec!(1))).unwrap();
        session.run_step(&mut engine).unwrap();
        session.reset();
        assert!(session.scheduler().is_empty());
        assert_eq!(session.clock().step(), 0);
    }
}
