//! Safety messages: the kinematic state of the vehicles around an
//! intersection, published as one record per intersection.

use std::sync::Arc;

use phasebridge_core::engine::{EngineError, SignalEngine, VehicleState};
use phasebridge_core::task::{Task, TaskContext, TaskError, TaskOutcome};
use phasebridge_types::{OutboundRecord, RecordType, SafetyMessage};
use rust_decimal::Decimal;
use tracing::debug;

use crate::site::JunctionSite;

/// Classification of an engine vehicle class in outside controllers' terms.
pub fn classification(vehicle_class: &str) -> &'static str {
    match vehicle_class {
        "passenger" => "passenger_Vehicle_TypeUnknown",
        "emergency" => "emergency_TypeUnknown",
        "motorcycle" => "motorcycle_TypeUnknown",
        "bus" => "transit_TypeUnknown",
        _ => "unknownVehicleClass",
    }
}

fn message(site: &JunctionSite, vehicle: VehicleState) -> SafetyMessage {
    SafetyMessage {
        classification: classification(&vehicle.vehicle_class).to_owned(),
        ptc_id: vehicle.id,
        node: site.reference(),
        x: vehicle.x,
        y: vehicle.y,
        lane_ref_id: vehicle.lane_index,
        speed: vehicle.speed,
        direction: vehicle.heading,
        acceleration: vehicle.acceleration,
        width: vehicle.width,
        length: vehicle.length,
        edge_id: vehicle.edge_id,
        lane_id: vehicle.lane_id,
    }
}

/// Safety messages of every vehicle within `site`'s radius, ordered by
/// vehicle id.
///
/// # Errors
///
/// Returns the engine's error if vehicles cannot be read.
pub fn safety_messages(
    site: &JunctionSite,
    engine: &dyn SignalEngine,
) -> Result<Vec<SafetyMessage>, EngineError> {
    let mut vehicles = engine.vehicles()?;
    vehicles.retain(|v| site.contains(v));
    vehicles.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(vehicles.into_iter().map(|v| message(site, v)).collect())
}

/// Cyclic task publishing the safety messages of `site`. Nothing is
/// published while no vehicle is in range.
pub fn safety_publisher(site: &Arc<JunctionSite>, period: Decimal) -> Task {
    let site = Arc::clone(site);
    let label = format!("publish SafetyMessage of {}", site.reference());
    Task::cyclic(
        label,
        None,
        period,
        move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
            let messages = safety_messages(&site, &*ctx.engine)?;
            if messages.is_empty() {
                debug!(node = %site.reference(), "no vehicles in range");
                return Ok(TaskOutcome::Info {
                    success: true,
                    record: None,
                });
            }
            let record = OutboundRecord::encode(RecordType::SafetyMessage, ctx.now, &messages)?;
            Ok(TaskOutcome::produced(record))
        },
    )
}
