//! The simulation engine port.
//!
//! Everything the coordinator needs from the traffic simulation goes through
//! [`SignalEngine`]: stepping, reading signal programs, installing new ones,
//! reading vehicles and detectors, and commanding vehicle speeds. A real
//! engine adapter implements the trait outside this workspace;
//! [`FixedTimeEngine`] is an in-memory engine that runs fixed-time signal
//! programs and holds whatever vehicles and detector readings it is given.

use std::collections::{BTreeMap, BTreeSet};

use phasebridge_types::{ProgramId, ProgramLogic, SimTime};
use rust_decimal::Decimal;
use tracing::debug;

/// Errors reported by a [`SignalEngine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No traffic light with this id exists.
    #[error("unknown traffic light: {tls_id}")]
    UnknownTrafficLight {
        /// The requested traffic light id.
        tls_id: String,
    },

    /// No vehicle with this id is in the network.
    #[error("unknown vehicle: {vehicle_id}")]
    UnknownVehicle {
        /// The requested vehicle id.
        vehicle_id: String,
    },

    /// No detector with this id exists.
    #[error("unknown detector: {detector_id}")]
    UnknownDetector {
        /// The requested detector id.
        detector_id: String,
    },

    /// A program was rejected by the engine.
    #[error("invalid signal program {program_id} for {tls_id}: {reason}")]
    InvalidProgram {
        /// Traffic light the program was meant for.
        tls_id: String,
        /// Id of the rejected program.
        program_id: ProgramId,
        /// Why the program was rejected.
        reason: String,
    },

    /// Engine configuration is unusable.
    #[error("invalid engine configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong.
        reason: String,
    },

    /// Simulated time or a duration sum overflowed.
    #[error("arithmetic overflow in engine time")]
    Overflow,

    /// The engine backend failed (connection lost, simulation ended, ...).
    #[error("engine backend failure: {reason}")]
    Backend {
        /// Backend-specific description.
        reason: String,
    },
}

/// Port to the external traffic simulation.
///
/// All traffic-light queries take the engine's traffic-light id. Phase
/// indices address subphases of the active program.
pub trait SignalEngine: Send {
    /// Advance the simulation by one step.
    fn step(&mut self) -> Result<(), EngineError>;

    /// Current simulated time.
    fn current_time(&self) -> SimTime;

    /// Id of the program the traffic light is running.
    fn program_id(&self, tls_id: &str) -> Result<ProgramId, EngineError>;

    /// Every program installed for the traffic light.
    fn program_logics(&self, tls_id: &str) -> Result<Vec<ProgramLogic>, EngineError>;

    /// Index of the running subphase within the active program.
    fn phase_index(&self, tls_id: &str) -> Result<usize, EngineError>;

    /// Seconds until the running subphase switches.
    fn time_to_next_switch(&self, tls_id: &str) -> Result<Decimal, EngineError>;

    /// Install `logic` and make it the active program, starting at its first
    /// subphase, effective immediately.
    fn install_program(&mut self, tls_id: &str, logic: ProgramLogic) -> Result<(), EngineError>;

    /// Command a vehicle's speed in m/s.
    fn set_vehicle_speed(&mut self, vehicle_id: &str, speed: Decimal) -> Result<(), EngineError>;

    /// Every vehicle currently in the network.
    fn vehicles(&self) -> Result<Vec<VehicleState>, EngineError>;

    /// Ids of the vehicles a lane-area detector saw during the last step.
    fn detector_vehicles(&self, detector_id: &str) -> Result<BTreeSet<String>, EngineError>;
}

/// Kinematic state of one vehicle, as read from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleState {
    /// Engine vehicle id.
    pub id: String,
    /// Easting in metres.
    pub x: Decimal,
    /// Northing in metres.
    pub y: Decimal,
    /// Speed in m/s.
    pub speed: Decimal,
    /// Acceleration in m/s^2.
    pub acceleration: Decimal,
    /// Heading in degrees clockwise from north.
    pub heading: Decimal,
    /// Length in metres.
    pub length: Decimal,
    /// Width in metres.
    pub width: Decimal,
    /// Engine vehicle class (`passenger`, `bus`, ...).
    pub vehicle_class: String,
    /// Edge the vehicle is on.
    pub edge_id: String,
    /// Lane the vehicle is on.
    pub lane_id: String,
    /// Index of that lane within the edge.
    pub lane_index: u32,
}

/// A speed command recorded by [`FixedTimeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedCommand {
    /// Target vehicle.
    pub vehicle_id: String,
    /// Commanded speed in m/s.
    pub speed: Decimal,
    /// Simulated time of the command.
    pub at: SimTime,
}

/// Running state of one traffic light.
#[derive(Debug, Clone)]
struct LightState {
    programs: Vec<ProgramLogic>,
    active: ProgramId,
    phase_index: usize,
    remaining: Decimal,
}

impl LightState {
    fn active_logic(&self) -> Option<&ProgramLogic> {
        self.programs.iter().find(|p| p.program_id == self.active)
    }

    /// Run the active program for `dt` seconds.
    fn advance(&mut self, dt: Decimal) -> Result<(), EngineError> {
        let durations: Vec<Decimal> = self
            .active_logic()
            .map(|logic| logic.subphases.iter().map(|s| s.duration).collect())
            .unwrap_or_default();
        if durations.is_empty() {
            return Ok(());
        }
        self.remaining = self.remaining.checked_sub(dt).ok_or(EngineError::Overflow)?;
        while self.remaining <= Decimal::ZERO {
            self.phase_index = self
                .phase_index
                .checked_add(1)
                .and_then(|i| i.checked_rem(durations.len()))
                .ok_or(EngineError::Overflow)?;
            let next = durations
                .get(self.phase_index)
                .copied()
                .ok_or(EngineError::Overflow)?;
            self.remaining = self.remaining.checked_add(next).ok_or(EngineError::Overflow)?;
        }
        Ok(())
    }
}

/// In-memory engine running fixed-time signal programs.
///
/// Each step advances simulated time by the step length and every traffic
/// light through its active program. Vehicles and detector readings are
/// placed from outside and do not move; speed commands are recorded and
/// overwrite the speed of a placed vehicle.
#[derive(Debug, Clone)]
pub struct FixedTimeEngine {
    now: SimTime,
    step_length: Decimal,
    lights: BTreeMap<String, LightState>,
    vehicles: BTreeMap<String, VehicleState>,
    detectors: BTreeMap<String, BTreeSet<String>>,
    speed_commands: Vec<SpeedCommand>,
}

impl FixedTimeEngine {
    /// Create an engine at time zero with no traffic lights.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `step_length` is not
    /// positive.
    pub fn new(step_length: Decimal) -> Result<Self, EngineError> {
        if step_length <= Decimal::ZERO {
            return Err(EngineError::InvalidConfig {
                reason: format!("step length must be positive, got {step_length}"),
            });
        }
        Ok(Self {
            now: SimTime::ZERO,
            step_length,
            lights: BTreeMap::new(),
            vehicles: BTreeMap::new(),
            detectors: BTreeMap::new(),
            speed_commands: Vec::new(),
        })
    }

    /// Add a traffic light running `logic` from its first subphase.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidProgram`] if the program has no
    /// subphases or a non-positive duration.
    pub fn add_traffic_light(&mut self, tls_id: &str, logic: ProgramLogic) -> Result<(), EngineError> {
        validate_program(tls_id, &logic)?;
        let remaining = first_duration(&logic);
        self.lights.insert(
            tls_id.to_owned(),
            LightState {
                active: logic.program_id,
                programs: vec![logic],
                phase_index: 0,
                remaining,
            },
        );
        Ok(())
    }

    /// Put a vehicle into the network, replacing one with the same id.
    pub fn place_vehicle(&mut self, vehicle: VehicleState) {
        self.vehicles.insert(vehicle.id.clone(), vehicle);
    }

    /// Take a vehicle out of the network.
    pub fn remove_vehicle(&mut self, vehicle_id: &str) -> Option<VehicleState> {
        self.vehicles.remove(vehicle_id)
    }

    /// Add a lane-area detector that sees no vehicles yet.
    pub fn add_detector(&mut self, detector_id: &str) {
        self.detectors.entry(detector_id.to_owned()).or_default();
    }

    /// Replace what a detector sees.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDetector`] if the detector was never
    /// added.
    pub fn set_detector_vehicles<I, S>(&mut self, detector_id: &str, vehicles: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seen = self
            .detectors
            .get_mut(detector_id)
            .ok_or_else(|| EngineError::UnknownDetector {
                detector_id: detector_id.to_owned(),
            })?;
        *seen = vehicles.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Speed commands received so far, oldest first.
    pub fn speed_commands(&self) -> &[SpeedCommand] {
        &self.speed_commands
    }

    /// Ids of every traffic light.
    pub fn traffic_light_ids(&self) -> impl Iterator<Item = &str> {
        self.lights.keys().map(String::as_str)
    }

    fn light(&self, tls_id: &str) -> Result<&LightState, EngineError> {
        self.lights
            .get(tls_id)
            .ok_or_else(|| EngineError::UnknownTrafficLight {
                tls_id: tls_id.to_owned(),
            })
    }
}

impl SignalEngine for FixedTimeEngine {
    fn step(&mut self) -> Result<(), EngineError> {
        self.now = self
            .now
            .checked_add(self.step_length)
            .ok_or(EngineError::Overflow)?;
        for light in self.lights.values_mut() {
            light.advance(self.step_length)?;
        }
        Ok(())
    }

    fn current_time(&self) -> SimTime {
        self.now
    }

    fn program_id(&self, tls_id: &str) -> Result<ProgramId, EngineError> {
        Ok(self.light(tls_id)?.active)
    }

    fn program_logics(&self, tls_id: &str) -> Result<Vec<ProgramLogic>, EngineError> {
        Ok(self.light(tls_id)?.programs.clone())
    }

    fn phase_index(&self, tls_id: &str) -> Result<usize, EngineError> {
        Ok(self.light(tls_id)?.phase_index)
    }

    fn time_to_next_switch(&self, tls_id: &str) -> Result<Decimal, EngineError> {
        Ok(self.light(tls_id)?.remaining)
    }

    fn install_program(&mut self, tls_id: &str, logic: ProgramLogic) -> Result<(), EngineError> {
        validate_program(tls_id, &logic)?;
        let light = self
            .lights
            .get_mut(tls_id)
            .ok_or_else(|| EngineError::UnknownTrafficLight {
                tls_id: tls_id.to_owned(),
            })?;
        debug!(
            tls_id,
            program_id = %logic.program_id,
            subphases = logic.subphases.len(),
            "installing signal program"
        );
        light.remaining = first_duration(&logic);
        light.active = logic.program_id;
        light.phase_index = 0;
        light.programs.retain(|p| p.program_id != logic.program_id);
        light.programs.push(logic);
        Ok(())
    }

    fn set_vehicle_speed(&mut self, vehicle_id: &str, speed: Decimal) -> Result<(), EngineError> {
        self.speed_commands.push(SpeedCommand {
            vehicle_id: vehicle_id.to_owned(),
            speed,
            at: self.now,
        });
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.speed = speed;
        }
        Ok(())
    }

    fn vehicles(&self) -> Result<Vec<VehicleState>, EngineError> {
        Ok(self.vehicles.values().cloned().collect())
    }

    fn detector_vehicles(&self, detector_id: &str) -> Result<BTreeSet<String>, EngineError> {
        self.detectors
            .get(detector_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDetector {
                detector_id: detector_id.to_owned(),
            })
    }
}

fn validate_program(tls_id: &str, logic: &ProgramLogic) -> Result<(), EngineError> {
    let invalid = |reason: &str| EngineError::InvalidProgram {
        tls_id: tls_id.to_owned(),
        program_id: logic.program_id,
        reason: reason.to_owned(),
    };
    if logic.subphases.is_empty() {
        return Err(invalid("program has no subphases"));
    }
    if logic.subphases.iter().any(|s| s.duration <= Decimal::ZERO) {
        return Err(invalid("subphase durations must be positive"));
    }
    Ok(())
}

fn first_duration(logic: &ProgramLogic) -> Decimal {
    logic
        .subphases
        .first()
        .map_or(Decimal::ZERO, |s| s.duration)
}
