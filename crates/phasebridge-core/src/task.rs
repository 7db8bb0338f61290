//! Scheduled units of work.
//!
//! A [`Task`] pairs an action with the simulated time it should run at and,
//! for periodic work, its period. Two kinds of action exist:
//!
//! - control implementation: changes engine state (installs a signal
//!   program, applies vehicle speeds) and reports success plus a detail;
//! - information production: reads engine state and may produce an
//!   [`OutboundRecord`] to publish.

use core::fmt;

use phasebridge_types::{OutboundRecord, SimTime, TaskId};
use rust_decimal::Decimal;

use crate::engine::{EngineError, SignalEngine};

/// Errors that abort a task and end the session.
///
/// Expected failures (a rejected command, a vehicle that left the network)
/// are reported through an unsuccessful [`TaskOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The engine failed while the task was running.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// A produced record could not be encoded.
    #[error("failed to encode record: {source}")]
    Encode {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The task found engine state it cannot work with.
    #[error("task {label} failed: {reason}")]
    Failed {
        /// Label of the failing task.
        label: String,
        /// What went wrong.
        reason: String,
    },
}

/// What a task reports after running.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Result of a control-implementation action.
    Control {
        /// Whether the engine accepted the change.
        success: bool,
        /// Human-readable detail for the log.
        detail: String,
    },
    /// Result of an information-production action.
    Info {
        /// Whether the information could be gathered.
        success: bool,
        /// Record to publish, if any.
        record: Option<OutboundRecord>,
    },
}

impl TaskOutcome {
    /// A successful control outcome.
    pub fn applied(detail: impl Into<String>) -> Self {
        Self::Control {
            success: true,
            detail: detail.into(),
        }
    }

    /// A successful information outcome carrying `record`.
    pub const fn produced(record: OutboundRecord) -> Self {
        Self::Info {
            success: true,
            record: Some(record),
        }
    }

    /// Whether the action succeeded.
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Control { success, .. } | Self::Info { success, .. } => *success,
        }
    }

    /// The record to publish: present only for a successful information
    /// outcome that carries one.
    pub fn into_record(self) -> Option<OutboundRecord> {
        match self {
            Self::Info {
                success: true,
                record,
            } => record,
            _ => None,
        }
    }
}

/// What an action may touch while it runs.
pub struct TaskContext<'a> {
    /// The simulation engine.
    pub engine: &'a mut dyn SignalEngine,
    /// Simulated time of the step the task runs in.
    pub now: SimTime,
}

/// The work a task performs.
///
/// Implemented for every `FnMut(&mut TaskContext) -> Result<TaskOutcome,
/// TaskError> + Send` closure.
pub trait TaskAction: Send {
    /// Run the action once.
    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskOutcome, TaskError>;
}

impl<F> TaskAction for F
where
    F: FnMut(&mut TaskContext<'_>) -> Result<TaskOutcome, TaskError> + Send,
{
    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskOutcome, TaskError> {
        self(ctx)
    }
}

/// A unit of work owned by the scheduler from insertion to removal.
pub struct Task {
    id: TaskId,
    label: String,
    exec_time: Option<SimTime>,
    cycle_time: Option<Decimal>,
    action: Box<dyn TaskAction>,
}

impl Task {
    /// A task that runs once at `exec_time`, or at the next step when
    /// `exec_time` is `None`.
    pub fn one_shot(
        label: impl Into<String>,
        exec_time: Option<SimTime>,
        action: impl TaskAction + 'static,
    ) -> Self {
        Self {
            id: TaskId::new(),
            label: label.into(),
            exec_time,
            cycle_time: None,
            action: Box::new(action),
        }
    }

    /// A task that runs every `period` seconds, first at `first_run`, or at
    /// the next step when `first_run` is `None`.
    pub fn cyclic(
        label: impl Into<String>,
        first_run: Option<SimTime>,
        period: Decimal,
        action: impl TaskAction + 'static,
    ) -> Self {
        Self {
            id: TaskId::new(),
            label: label.into(),
            exec_time: first_run,
            cycle_time: Some(period),
            action: Box::new(action),
        }
    }

    /// Unique id of this task.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Label used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// When the task is next due; `None` means immediately.
    pub const fn exec_time(&self) -> Option<SimTime> {
        self.exec_time
    }

    /// Period of a cyclic task; `None` for one-shot tasks.
    pub const fn cycle_time(&self) -> Option<Decimal> {
        self.cycle_time
    }

    pub(crate) const fn set_exec_time(&mut self, exec_time: SimTime) {
        self.exec_time = Some(exec_time);
    }

    /// Run the action once.
    pub fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskOutcome, TaskError> {
        self.action.execute(ctx)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("exec_time", &self.exec_time)
            .field("cycle_time", &self.cycle_time)
            .finish_non_exhaustive()
    }
}
