//! Simulation-time task scheduler.
//!
//! Tasks live in two binary min-heaps keyed by execution time, with an
//! insertion sequence number breaking ties so equal times run first-in,
//! first-out:
//!
//! - the cyclic heap holds periodic tasks, re-armed after every run by
//!   popping, advancing the execution time by the period, and pushing back;
//! - the single heap holds one-shot tasks, removed after they run.
//!
//! Once per step the step loop calls [`Scheduler::run_due`] with the engine
//! and the current time. Cyclic tasks run only on steps that land exactly on
//! their execution time; a cyclic task whose time fell between two steps is
//! skipped forward. One-shot tasks run on the first step at or after their
//! time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use phasebridge_types::{OutboundRecord, SIM_TIME_DECIMALS, SimTime};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::engine::SignalEngine;
use crate::task::{Task, TaskContext, TaskError};

/// Errors that can occur during scheduling.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A cyclic task was added with a period below the scheduling
    /// precision (one millisecond).
    #[error("task {label} has cycle time {cycle_time}, below the 0.001 s minimum")]
    InvalidCycleTime {
        /// Label of the rejected task.
        label: String,
        /// The rejected period.
        cycle_time: Decimal,
    },

    /// Advancing a cyclic task overflowed simulated time.
    #[error("execution time of task {label} overflowed")]
    TimeOverflow {
        /// Label of the affected task.
        label: String,
    },

    /// A task failed fatally.
    #[error("task error: {source}")]
    Task {
        /// The underlying task error.
        #[from]
        source: TaskError,
    },
}

/// A task in one of the heaps.
#[derive(Debug)]
struct Scheduled {
    seq: u64,
    task: Task,
}

impl Scheduled {
    fn key(&self) -> (Option<SimTime>, u64) {
        (self.task.exec_time(), self.seq)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest time. `None` (run
        // immediately) sorts before every time.
        other.key().cmp(&self.key())
    }
}

/// What one call to [`Scheduler::run_due`] did.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Number of cyclic task runs.
    pub cyclic_runs: usize,
    /// Number of one-shot task runs.
    pub single_runs: usize,
    /// Runs that reported failure.
    pub failures: usize,
    /// Records produced by successful information tasks.
    pub records: Vec<OutboundRecord>,
}

/// Two-heap scheduler for cyclic and one-shot tasks.
#[derive(Debug, Default)]
pub struct Scheduler {
    cyclic: BinaryHeap<Scheduled>,
    single: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task: to the cyclic heap when it has a cycle time, otherwise to
    /// the single heap.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidCycleTime`] if the cycle time is
    /// shorter than one millisecond; re-arming would not advance it.
    pub fn add_task(&mut self, task: Task) -> Result<(), SchedulerError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        match task.cycle_time() {
            Some(cycle_time) if cycle_time < min_cycle_time() => {
                Err(SchedulerError::InvalidCycleTime {
                    label: task.label().to_owned(),
                    cycle_time,
                })
            }
            Some(_) => {
                debug!(label = task.label(), exec_time = ?task.exec_time(), "cyclic task added");
                self.cyclic.push(Scheduled { seq, task });
                Ok(())
            }
            None => {
                debug!(label = task.label(), exec_time = ?task.exec_time(), "one-shot task added");
                self.single.push(Scheduled { seq, task });
                Ok(())
            }
        }
    }

    /// Run every task due at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal task error; tasks after it stay queued.
    pub fn run_due(
        &mut self,
        engine: &mut dyn SignalEngine,
        now: SimTime,
    ) -> Result<DrainReport, SchedulerError> {
        let mut report = DrainReport::default();
        let mut ctx = TaskContext { engine, now };
        self.drain_cyclic(&mut ctx, &mut report)?;
        self.drain_single(&mut ctx, &mut report)?;
        Ok(report)
    }

    fn drain_cyclic(
        &mut self,
        ctx: &mut TaskContext<'_>,
        report: &mut DrainReport,
    ) -> Result<(), SchedulerError> {
        while let Some(root) = self.cyclic.peek() {
            let due = root.task.exec_time();
            if due.is_some_and(|t| t > ctx.now) {
                break;
            }
            let Some(mut entry) = self.cyclic.pop() else {
                break;
            };
            match due {
                Some(missed) if missed < ctx.now => {
                    catch_up(&mut entry.task, ctx.now)?;
                    debug!(
                        label = entry.task.label(),
                        %missed,
                        next = ?entry.task.exec_time(),
                        "cyclic task skipped forward"
                    );
                }
                _ => {
                    // A task without a time is first due now.
                    entry.task.set_exec_time(ctx.now);
                    run_one(&mut entry.task, ctx, report)?;
                    report.cyclic_runs = report.cyclic_runs.saturating_add(1);
                    rearm(&mut entry.task)?;
                }
            }
            self.cyclic.push(entry);
        }
        Ok(())
    }

    fn drain_single(
        &mut self,
        ctx: &mut TaskContext<'_>,
        report: &mut DrainReport,
    ) -> Result<(), SchedulerError> {
        while self
            .single
            .peek()
            .is_some_and(|root| root.task.exec_time().is_none_or(|t| t <= ctx.now))
        {
            let Some(mut entry) = self.single.pop() else {
                break;
            };
            run_one(&mut entry.task, ctx, report)?;
            report.single_runs = report.single_runs.saturating_add(1);
        }
        Ok(())
    }

    /// Drop every queued task (session reset).
    pub fn clear(&mut self) {
        let dropped = self.len();
        self.cyclic.clear();
        self.single.clear();
        if dropped > 0 {
            info!(dropped, "scheduler cleared");
        }
    }

    /// Number of queued tasks across both heaps.
    pub fn len(&self) -> usize {
        self.cyclic.len().saturating_add(self.single.len())
    }

    /// Whether no task is queued.
    pub fn is_empty(&self) -> bool {
        self.cyclic.is_empty() && self.single.is_empty()
    }

    /// Earliest execution time across both heaps. `Some(None)` means a task
    /// is waiting to run at the next step.
    pub fn next_due(&self) -> Option<Option<SimTime>> {
        let cyclic = self.cyclic.peek().map(|s| s.task.exec_time());
        let single = self.single.peek().map(|s| s.task.exec_time());
        match (cyclic, single) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Smallest period that still advances after rounding.
fn min_cycle_time() -> Decimal {
    Decimal::new(1, SIM_TIME_DECIMALS)
}

fn run_one(
    task: &mut Task,
    ctx: &mut TaskContext<'_>,
    report: &mut DrainReport,
) -> Result<(), SchedulerError> {
    let outcome = task.execute(ctx)?;
    if !outcome.is_success() {
        warn!(label = task.label(), now = %ctx.now, ?outcome, "task reported failure");
        report.failures = report.failures.saturating_add(1);
    }
    if let Some(record) = outcome.into_record() {
        report.records.push(record);
    }
    Ok(())
}

/// Advance a cyclic task by its period, rounded to the scheduling precision.
fn rearm(task: &mut Task) -> Result<(), SchedulerError> {
    let overflow = || SchedulerError::TimeOverflow {
        label: task.label().to_owned(),
    };
    let (Some(exec_time), Some(period)) = (task.exec_time(), task.cycle_time()) else {
        return Err(overflow());
    };
    let next = exec_time.checked_add(period).ok_or_else(overflow)?.rounded();
    task.set_exec_time(next);
    Ok(())
}

/// Move a cyclic task that fell behind to its first execution time at or
/// after `now`, in one jump of whole periods.
fn catch_up(task: &mut Task, now: SimTime) -> Result<(), SchedulerError> {
    let overflow = || SchedulerError::TimeOverflow {
        label: task.label().to_owned(),
    };
    let (Some(exec_time), Some(period)) = (task.exec_time(), task.cycle_time()) else {
        return Err(overflow());
    };
    let periods = now
        .checked_since(exec_time)
        .and_then(|behind| behind.checked_div(period))
        .map(|periods| periods.ceil())
        .ok_or_else(overflow)?;
    let next = period
        .checked_mul(periods)
        .and_then(|jump| exec_time.checked_add(jump))
        .ok_or_else(overflow)?
        .rounded();
    task.set_exec_time(next);
    Ok(())
}
