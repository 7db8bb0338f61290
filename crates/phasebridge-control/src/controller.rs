//! Per-intersection signal controller.
//!
//! A [`SignalController`] translates between the engine's program of one
//! traffic light and the canonical, movement-oriented scheme outside
//! controllers work with:
//!
//! - reading: the active program is grouped into canonical phases and each
//!   phase's released connections are mapped back to movements;
//! - writing: an inbound scheme command becomes a new engine program,
//!   installed by a one-shot task at the start of the next cycle.
//!
//! Controllers are immutable after construction. All engine access goes
//! through the [`SignalEngine`] passed in by the caller.

use std::collections::BTreeSet;

use phasebridge_core::engine::SignalEngine;
use phasebridge_core::task::{Task, TaskContext, TaskError, TaskOutcome};
use phasebridge_types::{
    ConnectionIndex, DateTimeFilter, LightColor, Movement, NodeReferenceId, Phasic, PhasicCommand,
    ProgramId, ProgramLogic, RawSubphase, SignalExecution, SignalScheme, SignalSchemeCommand,
    SignalState, SimTime,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{MapError, SignalError};
use crate::movement_map::MovementConnectionMap;
use crate::phase_gather::{self, ExtractedPhase};
use crate::topology::NetworkTopology;

/// Signal controller of one intersection.
#[derive(Debug, Clone)]
pub struct SignalController {
    map: MovementConnectionMap,
}

/// A validated phase of an inbound command.
struct CommandPhase<'a> {
    movements: Option<&'a [String]>,
    green: Decimal,
    yellow: Decimal,
    all_red: Decimal,
}

impl SignalController {
    /// Build the controller of `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError`] if the node's movement map cannot be built.
    pub fn new(topology: &NetworkTopology, node_id: &str) -> Result<Self, MapError> {
        Ok(Self::from_map(MovementConnectionMap::build(topology, node_id)?))
    }

    /// Wrap an existing movement map.
    pub const fn from_map(map: MovementConnectionMap) -> Self {
        Self { map }
    }

    /// The intersection's movement map.
    pub const fn map(&self) -> &MovementConnectionMap {
        &self.map
    }

    /// Traffic light controlled.
    pub fn tls_id(&self) -> &str {
        self.map.tls_id()
    }

    /// Junction id in outside controllers' numbering.
    pub const fn reference(&self) -> NodeReferenceId {
        self.map.reference()
    }

    /// The program the traffic light is running.
    ///
    /// With a single installed program that program is used as-is;
    /// otherwise the one whose id matches the active program id.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::NoProgram`] if nothing is installed and
    /// [`SignalError::ProgramIdMismatch`] if the active id matches none.
    pub fn current_logic(&self, engine: &dyn SignalEngine) -> Result<ProgramLogic, SignalError> {
        let tls_id = self.tls_id();
        let mut programs = engine.program_logics(tls_id)?;
        if programs.len() > 1 {
            let active = engine.program_id(tls_id)?;
            return programs
                .into_iter()
                .find(|p| p.program_id == active)
                .ok_or_else(|| SignalError::ProgramIdMismatch {
                    tls_id: tls_id.to_owned(),
                    active,
                });
        }
        programs.pop().ok_or_else(|| SignalError::NoProgram {
            tls_id: tls_id.to_owned(),
        })
    }

    fn extract(&self, logic: &ProgramLogic) -> Result<Vec<ExtractedPhase>, SignalError> {
        phase_gather::extract(&logic.subphases).map_err(|source| SignalError::Extract {
            tls_id: self.tls_id().to_owned(),
            source,
        })
    }

    fn overflow(&self) -> SignalError {
        SignalError::Overflow {
            tls_id: self.tls_id().to_owned(),
        }
    }

    /// The active program as a canonical signal scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] if the program cannot be read or grouped into
    /// phases.
    pub fn current_scheme(&self, engine: &dyn SignalEngine) -> Result<SignalScheme, SignalError> {
        let scheme_id = engine.program_id(self.tls_id())?;
        let logic = self.current_logic(engine)?;
        let extracted = self.extract(&logic)?;

        let mut cycle = Decimal::ZERO;
        let mut phases = Vec::with_capacity(extracted.len());
        for (order, phase) in (1_u32..).zip(&extracted) {
            let timing = phase.timing;
            cycle = timing
                .total()
                .and_then(|total| cycle.checked_add(total))
                .ok_or_else(|| self.overflow())?;
            // Extraction guarantees green and yellow are set.
            let green = timing.green.unwrap_or_default();
            phases.push(Phasic {
                id: order,
                order,
                scat_no: String::new(),
                movements: self
                    .map
                    .movements_for_connections(&phase.connections)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                green,
                yellow: timing.yellow.unwrap_or_default(),
                all_red: timing.all_red.unwrap_or_default(),
                min_green: green,
                max_green: green,
            });
        }

        Ok(SignalScheme {
            scheme_id,
            node_id: self.reference(),
            time_span: DateTimeFilter::default(),
            cycle,
            control_mode: 0,
            min_cycle: cycle,
            max_cycle: cycle,
            base_signal_scheme_id: scheme_id,
            offset: Decimal::ZERO,
            phases,
        })
    }

    /// Simulated time at which the running program next returns to its
    /// first subphase: the rest of the current subphase plus every later
    /// subphase.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] if the engine cannot be read or the sum
    /// overflows.
    pub fn next_cycle_start(&self, engine: &dyn SignalEngine) -> Result<SimTime, SignalError> {
        let tls_id = self.tls_id();
        let logic = self.current_logic(engine)?;
        let index = engine.phase_index(tls_id)?;
        let remaining = engine.time_to_next_switch(tls_id)?;
        let later = logic
            .subphases
            .iter()
            .skip(index.saturating_add(1))
            .try_fold(remaining, |acc, s| acc.checked_add(s.duration))
            .ok_or_else(|| self.overflow())?;
        engine
            .current_time()
            .checked_add(later)
            .ok_or_else(|| self.overflow())
    }

    /// Which canonical phase is running and for how much longer.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] if the program cannot be read or grouped into
    /// phases.
    pub fn execution_snapshot(&self, engine: &dyn SignalEngine) -> Result<SignalExecution, SignalError> {
        let tls_id = self.tls_id();
        let scheme_id = engine.program_id(tls_id)?;
        let logic = self.current_logic(engine)?;
        let extracted = self.extract(&logic)?;
        let index = engine.phase_index(tls_id)?;
        let mut remaining = engine.time_to_next_switch(tls_id)?;

        let position = phase_gather::phase_of_subphase(&extracted, index);
        if let Some(phase) = position.and_then(|p| extracted.get(p)) {
            let after_current = phase
                .subphases
                .iter()
                .skip_while(|i| **i != index)
                .skip(1);
            for later in after_current {
                let duration = logic
                    .subphases
                    .get(*later)
                    .map_or(Decimal::ZERO, |s| s.duration);
                remaining = remaining
                    .checked_add(duration)
                    .ok_or_else(|| self.overflow())?;
            }
        }

        let phase_order = position
            .and_then(|p| u32::try_from(p).ok())
            .and_then(|p| p.checked_add(1))
            .unwrap_or(0);
        Ok(SignalExecution {
            node_id: self.reference(),
            scheme_id,
            phase_order,
            remaining,
        })
    }

    /// Turn an inbound scheme command into a task installing the new
    /// program at the start of the next cycle.
    ///
    /// Malformed commands are logged and yield `Ok(None)` before the engine
    /// is consulted. With movements on every phase, the program is built
    /// from scratch; with movements on no phase, the active program keeps
    /// its states and only its durations change.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the engine's current program cannot be
    /// read.
    pub fn create_control_task(
        &self,
        engine: &dyn SignalEngine,
        command: &SignalSchemeCommand,
    ) -> Result<Option<Task>, SignalError> {
        let Some(phases) = self.validate(command) else {
            return Ok(None);
        };

        let subphases = if phases.iter().all(|p| p.movements.is_some()) {
            self.build_subphases(&phases)
        } else if phases.iter().all(|p| p.movements.is_none()) {
            match self.retime_subphases(engine, &phases)? {
                Some(subphases) => subphases,
                None => return Ok(None),
            }
        } else {
            info!(
                tls = self.tls_id(),
                "scheme mixes phases with and without movements, cannot create control"
            );
            return Ok(None);
        };

        let program_id = engine
            .program_logics(self.tls_id())?
            .iter()
            .map(|p| p.program_id)
            .max()
            .map_or(Some(ProgramId(0)), ProgramId::next)
            .ok_or_else(|| SignalError::ProgramIdsExhausted {
                tls_id: self.tls_id().to_owned(),
            })?;
        let exec_time = self.next_cycle_start(engine)?;
        let logic = ProgramLogic {
            program_id,
            subphases,
        };
        debug!(
            tls = self.tls_id(),
            %program_id,
            %exec_time,
            subphases = logic.subphases.len(),
            "control task created"
        );

        let tls_id = self.tls_id().to_owned();
        let label = format!("install program {program_id} on {tls_id}");
        Ok(Some(Task::one_shot(
            label,
            Some(exec_time),
            move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                ctx.engine.install_program(&tls_id, logic.clone())?;
                info!(tls = %tls_id, %program_id, now = %ctx.now, "signal program installed");
                Ok(TaskOutcome::applied(format!(
                    "program {program_id} installed on {tls_id}"
                )))
            },
        )))
    }

    /// Sort and check the command's phases without touching the engine.
    fn validate<'a>(&self, command: &'a SignalSchemeCommand) -> Option<Vec<CommandPhase<'a>>> {
        let Some(phases) = command.phases.as_deref().filter(|p| !p.is_empty()) else {
            info!(
                tls = self.tls_id(),
                "invalid signal scheme without phases, cannot create control"
            );
            return None;
        };
        let mut sorted: Vec<&PhasicCommand> = phases.iter().collect();
        sorted.sort_by_key(|p| p.order.unwrap_or(0));

        let mut validated = Vec::with_capacity(sorted.len());
        for phase in sorted {
            let (Some(green), Some(yellow)) = (phase.green, phase.yellow) else {
                info!(
                    tls = self.tls_id(),
                    order = ?phase.order,
                    "green or yellow missing, cannot create control"
                );
                return None;
            };
            let all_red = phase.all_red.unwrap_or_default();
            if green <= Decimal::ZERO || yellow <= Decimal::ZERO || all_red < Decimal::ZERO {
                info!(
                    tls = self.tls_id(),
                    order = ?phase.order,
                    %green,
                    %yellow,
                    %all_red,
                    "phase durations out of range, cannot create control"
                );
                return None;
            }
            validated.push(CommandPhase {
                movements: phase.movements.as_deref(),
                green,
                yellow,
                all_red,
            });
        }
        Some(validated)
    }

    /// Green, yellow, and optional all-red subphases for every phase.
    fn build_subphases(&self, phases: &[CommandPhase<'_>]) -> Vec<RawSubphase> {
        let width = self.map.connection_count();
        let mut subphases = Vec::with_capacity(phases.len().saturating_mul(3));
        for phase in phases {
            let released = self.released_connections(phase.movements.unwrap_or_default());
            if released.is_empty() {
                info!(tls = self.tls_id(), "phase releases no known movement, running all-red");
            }
            subphases.push(RawSubphase::new(
                SignalState::with_active(width, &released, LightColor::Green),
                phase.green,
            ));
            subphases.push(RawSubphase::new(
                SignalState::with_active(width, &released, LightColor::Yellow),
                phase.yellow,
            ));
            if phase.all_red > Decimal::ZERO {
                subphases.push(RawSubphase::new(SignalState::all_red(width), phase.all_red));
            }
        }
        subphases
    }

    /// Connections of every known movement in `movements`.
    fn released_connections(&self, movements: &[String]) -> BTreeSet<ConnectionIndex> {
        let mut released = BTreeSet::new();
        for raw in movements {
            let Some(connections) = raw
                .parse::<Movement>()
                .ok()
                .and_then(|m| self.map.connections_for_movement(m))
            else {
                info!(
                    tls = self.tls_id(),
                    movement = %raw,
                    "movement is not defined at this intersection, skipping"
                );
                continue;
            };
            released.extend(connections.iter().copied());
        }
        released
    }

    /// The active program's states with the command's durations. Within a
    /// phase, successive subphases take green, yellow, then all-red.
    fn retime_subphases(
        &self,
        engine: &dyn SignalEngine,
        phases: &[CommandPhase<'_>],
    ) -> Result<Option<Vec<RawSubphase>>, SignalError> {
        let current = self.current_logic(engine)?;
        let per_phase = current
            .subphases
            .len()
            .checked_div(phases.len())
            .filter(|per| per.checked_mul(phases.len()) == Some(current.subphases.len()));
        let Some(per_phase) = per_phase else {
            info!(
                tls = self.tls_id(),
                subphases = current.subphases.len(),
                phases = phases.len(),
                "phase count does not divide the running program, cannot create control"
            );
            return Ok(None);
        };

        let mut subphases = Vec::with_capacity(current.subphases.len());
        let mut states = current.subphases.into_iter().map(|s| s.state);
        for phase in phases {
            let durations = [phase.green, phase.yellow, phase.all_red];
            for slot in 0..per_phase {
                let duration = durations.get(slot).copied().unwrap_or_default();
                let Some(state) = states.next() else {
                    return Ok(None);
                };
                if duration <= Decimal::ZERO {
                    info!(
                        tls = self.tls_id(),
                        slot,
                        "retimed subphase would have no duration, cannot create control"
                    );
                    return Ok(None);
                }
                subphases.push(RawSubphase::new(state, duration));
            }
        }
        Ok(Some(subphases))
    }
}
