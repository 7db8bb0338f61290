//! Error types for the signal coordinator binary.
//!
//! [`EngineBinError`] is the top-level error type that wraps all possible
//! failure modes during startup and session execution.

use phasebridge_types::RecordType;

/// Top-level error for the signal coordinator binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineBinError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: phasebridge_core::config::ConfigError,
    },

    /// The road network could not be loaded.
    #[error("topology error: {source}")]
    Topology {
        /// The underlying topology error.
        #[from]
        source: phasebridge_control::error::TopologyError,
    },

    /// A movement map could not be built.
    #[error("movement map error: {source}")]
    Map {
        /// The underlying map error.
        #[from]
        source: phasebridge_control::error::MapError,
    },

    /// The engine rejected its setup.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: phasebridge_core::engine::EngineError,
    },

    /// A periodic task could not be scheduled.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: phasebridge_core::scheduler::SchedulerError,
    },

    /// The session ended with a fatal error.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: phasebridge_core::runner::RunnerError,
    },

    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// An inbound subject does not name a known record type.
    #[error("subject {subject} does not name a record type")]
    UnknownSubject {
        /// The offending subject.
        subject: String,
    },

    /// An inbound payload is not valid JSON.
    #[error("invalid {record_type} payload: {source}")]
    Payload {
        /// Record type of the subject the payload arrived on.
        record_type: RecordType,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}
