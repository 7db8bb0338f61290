//! Records exchanged with outside controllers over the messaging channel.
//!
//! Field names follow the external message schema (`node_id`, `allred`,
//! `base_signal_scheme_id`, ...). Inbound command records are tolerant: every
//! field is optional so that malformed commands can be rejected with a log
//! line instead of a decode failure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::RecordType;
use crate::ids::ProgramId;
use crate::time::SimTime;

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Network-wide reference to one intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NodeReferenceId {
    /// Region the intersection belongs to.
    pub region: u32,
    /// Intersection number within the region.
    pub id: u32,
}

impl core::fmt::Display for NodeReferenceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.region, self.id)
    }
}

/// Wall-clock time of day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LocalTimePoint {
    /// Hour (0-23).
    pub hh: u8,
    /// Minute (0-59).
    pub mm: u8,
    /// Second (0-59).
    pub ss: u8,
}

/// Validity window of a signal scheme. Empty means always valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct DateTimeFilter {
    /// Months the scheme applies to (`"JAN"`, ...).
    pub month_filter: Vec<String>,
    /// Days of the month the scheme applies to.
    pub day_filter: Vec<u8>,
    /// Weekdays the scheme applies to (`"MON"`, ...).
    pub weekday_filter: Vec<String>,
    /// Start of the daily window.
    pub from_time_point: Option<LocalTimePoint>,
    /// End of the daily window.
    pub to_time_point: Option<LocalTimePoint>,
}

// ---------------------------------------------------------------------------
// Signal schemes
// ---------------------------------------------------------------------------

/// One phase of a published signal scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Phasic {
    /// Phase number, equal to `order` for reconstructed schemes.
    pub id: u32,
    /// Position in the cycle, starting at 1.
    pub order: u32,
    /// Phase number in the field controller's own numbering.
    pub scat_no: String,
    /// Movement codes released in this phase, as decimal strings.
    pub movements: Vec<String>,
    /// Green interval in seconds.
    #[ts(as = "String")]
    pub green: Decimal,
    /// Yellow interval in seconds.
    #[ts(as = "String")]
    pub yellow: Decimal,
    /// All-red clearance in seconds.
    #[serde(rename = "allred")]
    #[ts(as = "String")]
    pub all_red: Decimal,
    /// Minimum green in seconds.
    #[ts(as = "String")]
    pub min_green: Decimal,
    /// Maximum green in seconds.
    #[ts(as = "String")]
    pub max_green: Decimal,
}

/// A canonical, movement-oriented signal timing plan for one intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SignalScheme {
    /// Scheme id; for reconstructed schemes the engine program id.
    pub scheme_id: ProgramId,
    /// The intersection this scheme controls.
    pub node_id: NodeReferenceId,
    /// Validity window.
    pub time_span: DateTimeFilter,
    /// Cycle length in seconds.
    #[ts(as = "String")]
    pub cycle: Decimal,
    /// Control mode; 0 is fixed-time.
    pub control_mode: u8,
    /// Minimum cycle length in seconds.
    #[ts(as = "String")]
    pub min_cycle: Decimal,
    /// Maximum cycle length in seconds.
    #[ts(as = "String")]
    pub max_cycle: Decimal,
    /// Scheme this one was derived from.
    pub base_signal_scheme_id: ProgramId,
    /// Cycle offset in seconds.
    #[ts(as = "String")]
    pub offset: Decimal,
    /// Phases in cycle order.
    pub phases: Vec<Phasic>,
}

/// One phase of an inbound scheme command. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PhasicCommand {
    /// Position in the cycle; missing sorts as 0.
    pub order: Option<u32>,
    /// Movement codes; when absent the running phase layout is retimed.
    pub movements: Option<Vec<String>>,
    /// Green interval in seconds.
    #[ts(as = "Option<String>")]
    pub green: Option<Decimal>,
    /// Yellow interval in seconds.
    #[ts(as = "Option<String>")]
    pub yellow: Option<Decimal>,
    /// All-red clearance in seconds.
    #[serde(rename = "allred")]
    #[ts(as = "Option<String>")]
    pub all_red: Option<Decimal>,
}

/// Inbound request to run a new signal scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct SignalSchemeCommand {
    /// Target intersection.
    pub node_id: Option<NodeReferenceId>,
    /// Scheme id assigned by the sender; informational only.
    pub scheme_id: Option<u32>,
    /// Requested phases.
    pub phases: Option<Vec<PhasicCommand>>,
}

/// Snapshot of what a traffic light is executing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SignalExecution {
    /// The intersection.
    pub node_id: NodeReferenceId,
    /// Engine program currently running.
    pub scheme_id: ProgramId,
    /// Order of the canonical phase currently running, starting at 1.
    pub phase_order: u32,
    /// Seconds until the running subphase switches.
    #[ts(as = "String")]
    pub remaining: Decimal,
}

/// Inbound request to publish the currently executing scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct SignalExecutionRequirement {
    /// Intersection to report; every intersection when absent.
    pub node_id: Option<NodeReferenceId>,
}

// ---------------------------------------------------------------------------
// Vehicle guidance
// ---------------------------------------------------------------------------

/// One timed speed advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GuideInfo {
    /// Simulated time (seconds) from which the advice applies.
    #[ts(as = "String")]
    pub time: Decimal,
    /// Advised speed in units of 0.1 m/s.
    #[ts(as = "String")]
    pub guide: Decimal,
}

/// Inbound speed guidance for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpeedGuide {
    /// Engine vehicle id.
    pub veh_id: String,
    /// Advice entries, in any order.
    pub guide_info: Vec<GuideInfo>,
}

// ---------------------------------------------------------------------------
// Traffic telemetry
// ---------------------------------------------------------------------------

/// Kinematic state of one vehicle near an intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SafetyMessage {
    /// Engine vehicle id.
    pub ptc_id: String,
    /// Intersection the vehicle was reported with.
    pub node: NodeReferenceId,
    /// Easting in metres.
    #[ts(as = "String")]
    pub x: Decimal,
    /// Northing in metres.
    #[ts(as = "String")]
    pub y: Decimal,
    /// Index of the lane within its edge, 0 being the rightmost.
    pub lane_ref_id: u32,
    /// Speed in m/s.
    #[ts(as = "String")]
    pub speed: Decimal,
    /// Heading in degrees clockwise from north.
    #[ts(as = "String")]
    pub direction: Decimal,
    /// Longitudinal acceleration in m/s^2.
    #[ts(as = "String")]
    pub acceleration: Decimal,
    /// Vehicle width in metres.
    #[ts(as = "String")]
    pub width: Decimal,
    /// Vehicle length in metres.
    #[ts(as = "String")]
    pub length: Decimal,
    /// Vehicle classification (`passenger_Vehicle_TypeUnknown`, ...).
    pub classification: String,
    /// Engine edge the vehicle is on.
    pub edge_id: String,
    /// Engine lane the vehicle is on.
    pub lane_id: String,
}

/// Volume counted by one detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LaneFlow {
    /// Engine detector id.
    pub detector_id: String,
    /// Vehicles that entered the detector during the period.
    pub volume: u32,
    /// Length of the counting period in seconds.
    #[ts(as = "String")]
    pub period: Decimal,
}

/// Detector volumes of one intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficFlow {
    /// The intersection.
    pub node_id: NodeReferenceId,
    /// One entry per detector with a completed counting period.
    pub stats: Vec<LaneFlow>,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A decoded inbound record awaiting a task factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InboundRecord {
    /// Record type, taken from the channel the record arrived on.
    pub record_type: RecordType,
    /// Record body.
    pub payload: serde_json::Value,
}

/// A record produced by a task, to be published after the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OutboundRecord {
    /// Record type; selects the outbound channel.
    pub record_type: RecordType,
    /// Simulated time the record was produced at.
    pub generated_at: SimTime,
    /// Record body.
    pub payload: serde_json::Value,
}

impl OutboundRecord {
    /// Serialize `body` into an outbound record.
    pub fn encode<T: Serialize>(
        record_type: RecordType,
        generated_at: SimTime,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            record_type,
            generated_at,
            payload: serde_json::to_value(body)?,
        })
    }
}
