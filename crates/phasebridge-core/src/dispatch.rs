//! Turning inbound records into tasks.
//!
//! Each record type may have one [`TaskFactory`]. A factory decodes the
//! record, consults the engine if it needs to, and returns at most one task
//! for the scheduler. Records without a factory, and records that fail to
//! decode, are logged and dropped; only [`FactoryError::Fatal`] stops the
//! session.

use std::collections::BTreeMap;

use phasebridge_types::{InboundRecord, RecordType, SimTime};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::engine::SignalEngine;
use crate::task::Task;

/// Errors a factory can report.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// The record body does not match its record type. Logged and dropped.
    #[error("malformed {record_type} record: {source}")]
    Malformed {
        /// Type of the rejected record.
        record_type: RecordType,
        /// The underlying decode error.
        source: serde_json::Error,
    },

    /// The factory hit an inconsistency it cannot recover from.
    #[error("fatal error handling {record_type} record: {source}")]
    Fatal {
        /// Type of the record being handled.
        record_type: RecordType,
        /// The underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FactoryError {
    /// Wrap `source` as a fatal error.
    pub fn fatal(
        record_type: RecordType,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fatal {
            record_type,
            source: Box::new(source),
        }
    }
}

/// Decode the body of `record` as `T`.
///
/// # Errors
///
/// Returns [`FactoryError::Malformed`] when the body does not fit `T`.
pub fn decode<T: DeserializeOwned>(record: &InboundRecord) -> Result<T, FactoryError> {
    T::deserialize(&record.payload).map_err(|source| FactoryError::Malformed {
        record_type: record.record_type,
        source,
    })
}

/// Read-only view of the session handed to factories.
pub struct FactoryContext<'a> {
    /// The simulation engine.
    pub engine: &'a dyn SignalEngine,
    /// Simulated time of the current step.
    pub now: SimTime,
}

/// Builds tasks from inbound records of one type.
///
/// Implemented for every `FnMut(&InboundRecord, &FactoryContext) ->
/// Result<Option<Task>, FactoryError> + Send` closure.
pub trait TaskFactory: Send {
    /// Turn one record into zero or one task.
    fn create(
        &mut self,
        record: &InboundRecord,
        ctx: &FactoryContext<'_>,
    ) -> Result<Option<Task>, FactoryError>;
}

impl<F> TaskFactory for F
where
    F: FnMut(&InboundRecord, &FactoryContext<'_>) -> Result<Option<Task>, FactoryError> + Send,
{
    fn create(
        &mut self,
        record: &InboundRecord,
        ctx: &FactoryContext<'_>,
    ) -> Result<Option<Task>, FactoryError> {
        self(record, ctx)
    }
}

/// Record type to factory mapping.
#[derive(Default)]
pub struct TaskFactoryRegistry {
    factories: BTreeMap<RecordType, Box<dyn TaskFactory>>,
}

impl core::fmt::Debug for TaskFactoryRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskFactoryRegistry")
            .field("record_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TaskFactoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `record_type`, replacing any earlier one.
    pub fn register(&mut self, record_type: RecordType, factory: impl TaskFactory + 'static) {
        if self
            .factories
            .insert(record_type, Box::new(factory))
            .is_some()
        {
            warn!(%record_type, "replacing task factory");
        }
    }

    /// Whether a factory is registered for `record_type`.
    pub fn handles(&self, record_type: RecordType) -> bool {
        self.factories.contains_key(&record_type)
    }

    /// Run the factory for `record`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Fatal`] if the factory reports one. Missing
    /// factories and malformed records yield `Ok(None)`.
    pub fn dispatch(
        &mut self,
        record: &InboundRecord,
        ctx: &FactoryContext<'_>,
    ) -> Result<Option<Task>, FactoryError> {
        let record_type = record.record_type;
        let Some(factory) = self.factories.get_mut(&record_type) else {
            debug!(%record_type, "no task factory for record type, dropping record");
            return Ok(None);
        };
        match factory.create(record, ctx) {
            Ok(task) => Ok(task),
            Err(err @ FactoryError::Malformed { .. }) => {
                warn!(error = %err, "dropping inbound record");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::engine::{EngineError, FixedTimeEngine};
    use crate::task::{TaskContext, TaskError, TaskOutcome};

    #[derive(Deserialize)]
    struct Ping {
        label: String,
    }

    fn ping_factory(
        record: &InboundRecord,
        ctx: &FactoryContext<'_>,
    ) -> Result<Option<Task>, FactoryError> {
        let ping: Ping = decode(record)?;
        Ok(Some(Task::one_shot(
            ping.label,
            Some(ctx.now),
            |_ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                Ok(TaskOutcome::applied("pong"))
            },
        )))
    }

    fn inbound(record_type: RecordType, payload: serde_json::Value) -> InboundRecord {
        InboundRecord {
            record_type,
            payload,
        }
    }

    #[test]
    fn registered_factory_builds_task() {
        let engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let ctx = FactoryContext {
            engine: &engine,
            now: SimTime::ZERO,
        };
        let mut registry = TaskFactoryRegistry::new();
        registry.register(RecordType::SignalScheme, ping_factory);
        assert!(registry.handles(RecordType::SignalScheme));

        let record = inbound(RecordType::SignalScheme, json!({ "label": "p1" }));
        let task = registry.dispatch(&record, &ctx).unwrap().unwrap();
        assert_eq!(task.label(), "p1");
    }

    #[test]
    fn unregistered_type_is_dropped() {
        let engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let ctx = FactoryContext {
            engine: &engine,
            now: SimTime::ZERO,
        };
        let mut registry = TaskFactoryRegistry::new();
        let record = inbound(RecordType::SpeedGuide, json!({}));
        assert!(registry.dispatch(&record, &ctx).unwrap().is_none());
    }

    #[test]
    fn malformed_record_is_dropped() {
        let engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let ctx = FactoryContext {
            engine: &engine,
            now: SimTime::ZERO,
        };
        let mut registry = TaskFactoryRegistry::new();
        registry.register(RecordType::SignalScheme, ping_factory);
        let record = inbound(RecordType::SignalScheme, json!({ "label": 5 }));
        assert!(registry.dispatch(&record, &ctx).unwrap().is_none());
    }

    #[test]
    fn fatal_error_propagates() {
        let engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let ctx = FactoryContext {
            engine: &engine,
            now: SimTime::ZERO,
        };
        let mut registry = TaskFactoryRegistry::new();
        registry.register(
            RecordType::SignalScheme,
            |record: &InboundRecord, _ctx: &FactoryContext<'_>| -> Result<Option<Task>, FactoryError> {
                Err(FactoryError::fatal(
                    record.record_type,
                    EngineError::UnknownTrafficLight {
                        tls_id: "J9".to_owned(),
                    },
                ))
            },
        );
        let record = inbound(RecordType::SignalScheme, json!({}));
        assert!(matches!(
            registry.dispatch(&record, &ctx),
            Err(FactoryError::Fatal { .. })
        ));
    }
}
