//! Shared type definitions for the PhaseBridge signal coordinator.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: movement numbering, signal programs in both the engine and
//! the canonical view, simulated time, and the records exchanged with
//! outside controllers. Wire records flow to `TypeScript` via `ts-rs` for
//! downstream consumers.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier newtypes (tasks, sessions, connections, programs)
//! - [`enums`] -- Directions, turns, light colours, movements, record types
//! - [`time`] -- Fixed-point simulated time
//! - [`signal`] -- Signal states, engine programs, canonical phases
//! - [`records`] -- Inbound commands, outbound reports, and traffic telemetry

pub mod enums;
pub mod ids;
pub mod records;
pub mod signal;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use enums::{
    ALL_MOVEMENTS, ALL_RECORD_TYPES, Direction, LightColor, Movement, RecordType, Turn,
    UnknownMovement,
};
pub use ids::{ConnectionIndex, ProgramId, SessionId, TaskId};
pub use records::{
    DateTimeFilter, GuideInfo, InboundRecord, LaneFlow, LocalTimePoint, NodeReferenceId,
    OutboundRecord, Phasic, PhasicCommand, SafetyMessage, SignalExecution,
    SignalExecutionRequirement, SignalScheme, SignalSchemeCommand, SpeedGuide, TrafficFlow,
};
pub use signal::{
    CanonicalPhase, InvalidSignalState, PhaseTiming, ProgramLogic, RawSubphase, SignalState,
    TimingMergeError, cycle_length,
};
pub use time::{SIM_TIME_DECIMALS, SimTime};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for every exported type.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings into `bindings/` relative to the crate
        // root when `export_all` runs.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::TaskId::export_all();
        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::ConnectionIndex::export_all();
        let _ = crate::ids::ProgramId::export_all();

        // Enums
        let _ = crate::enums::Direction::export_all();
        let _ = crate::enums::Turn::export_all();
        let _ = crate::enums::LightColor::export_all();
        let _ = crate::enums::RecordType::export_all();

        // Time and signal programs
        let _ = crate::time::SimTime::export_all();
        let _ = crate::signal::RawSubphase::export_all();
        let _ = crate::signal::ProgramLogic::export_all();
        let _ = crate::signal::PhaseTiming::export_all();
        let _ = crate::signal::CanonicalPhase::export_all();

        // Records
        let _ = crate::records::NodeReferenceId::export_all();
        let _ = crate::records::LocalTimePoint::export_all();
        let _ = crate::records::DateTimeFilter::export_all();
        let _ = crate::records::Phasic::export_all();
        let _ = crate::records::SignalScheme::export_all();
        let _ = crate::records::PhasicCommand::export_all();
        let _ = crate::records::SignalSchemeCommand::export_all();
        let _ = crate::records::SignalExecution::export_all();
        let _ = crate::records::SignalExecutionRequirement::export_all();
        let _ = crate::records::GuideInfo::export_all();
        let _ = crate::records::SpeedGuide::export_all();
        let _ = crate::records::SafetyMessage::export_all();
        let _ = crate::records::LaneFlow::export_all();
        let _ = crate::records::TrafficFlow::export_all();
        let _ = crate::records::InboundRecord::export_all();
        let _ = crate::records::OutboundRecord::export_all();
    }
}
