//! Vehicle speed guidance.
//!
//! Outside controllers send speed-guide records listing, per vehicle, the
//! speed to hold from a given simulated time on. Guidance is stored until
//! its time comes; a cyclic task then applies the latest due speed of each
//! vehicle to the engine and forgets everything up to that time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use phasebridge_core::dispatch::{self, FactoryContext, FactoryError};
use phasebridge_core::engine::SignalEngine;
use phasebridge_core::task::{Task, TaskContext, TaskError, TaskOutcome};
use phasebridge_types::{InboundRecord, SimTime, SpeedGuide};
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Guide values are sent in tenths of a metre per second.
const GUIDE_SCALE: Decimal = Decimal::TEN;

/// Pending guidance of every vehicle: vehicle id -> time -> speed (m/s).
#[derive(Debug, Default)]
struct GuidanceStore {
    plans: BTreeMap<String, BTreeMap<Decimal, Decimal>>,
}

/// Speed guidance shared between the inbound factory and the applying task.
///
/// Cloning is cheap and every clone sees the same guidance.
#[derive(Debug, Clone, Default)]
pub struct SpeedGuidance {
    inner: Arc<Mutex<GuidanceStore>>,
}

/// One speed handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSpeed {
    /// Target vehicle.
    pub vehicle_id: String,
    /// Speed in m/s.
    pub speed: Decimal,
}

impl SpeedGuidance {
    /// An empty guidance store.
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, GuidanceStore> {
        match self.inner.lock() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store every entry of `guide`, replacing earlier guidance for the same
    /// vehicle and time. Negative guide values are skipped. Returns the
    /// number of entries stored.
    pub fn ingest(&self, guide: &SpeedGuide) -> usize {
        let mut store = self.store();
        let plan = store.plans.entry(guide.veh_id.clone()).or_default();
        let mut stored: usize = 0;
        for info in &guide.guide_info {
            let Some(speed) = info
                .guide
                .checked_div(GUIDE_SCALE)
                .filter(|s| *s >= Decimal::ZERO)
            else {
                warn!(vehicle = %guide.veh_id, guide = %info.guide, "invalid speed guide value, skipping");
                continue;
            };
            plan.insert(info.time, speed);
            stored = stored.saturating_add(1);
        }
        if plan.is_empty() {
            store.plans.remove(&guide.veh_id);
        }
        stored
    }

    /// Remove and return, for every vehicle, the latest speed whose time is
    /// at or before `now`. Earlier due entries are dropped unapplied.
    pub fn take_due(&self, now: SimTime) -> Vec<AppliedSpeed> {
        let now = now.secs();
        let mut store = self.store();
        let mut due = Vec::new();
        store.plans.retain(|vehicle_id, plan| {
            let pending = plan.split_off(&now);
            let latest = plan.values().next_back().copied();
            let exact = pending.get(&now).copied();
            *plan = pending;
            plan.remove(&now);
            if let Some(speed) = exact.or(latest) {
                due.push(AppliedSpeed {
                    vehicle_id: vehicle_id.clone(),
                    speed,
                });
            }
            !plan.is_empty()
        });
        due
    }

    /// Apply every due speed to the engine. A vehicle the engine rejects
    /// (typically one that already left the network) is logged and skipped.
    /// Returns the number of speeds applied and rejected.
    pub fn apply_due(&self, engine: &mut dyn SignalEngine, now: SimTime) -> (usize, usize) {
        let mut applied: usize = 0;
        let mut rejected: usize = 0;
        for AppliedSpeed { vehicle_id, speed } in self.take_due(now) {
            match engine.set_vehicle_speed(&vehicle_id, speed) {
                Ok(()) => {
                    debug!(vehicle = %vehicle_id, %speed, %now, "speed guidance applied");
                    applied = applied.saturating_add(1);
                }
                Err(err) => {
                    warn!(vehicle = %vehicle_id, error = %err, "speed guidance rejected by engine");
                    rejected = rejected.saturating_add(1);
                }
            }
        }
        (applied, rejected)
    }

    /// Number of vehicles with pending guidance.
    pub fn vehicle_count(&self) -> usize {
        self.store().plans.len()
    }

    /// Drop all pending guidance.
    pub fn clear(&self) {
        self.store().plans.clear();
    }

    /// Task factory storing inbound speed-guide records. Never creates a
    /// task; the guidance is picked up by [`task`](Self::task).
    pub fn factory(
        &self,
    ) -> impl FnMut(&InboundRecord, &FactoryContext<'_>) -> Result<Option<Task>, FactoryError> + Send + 'static
    {
        let guidance = self.clone();
        move |record: &InboundRecord, _ctx: &FactoryContext<'_>| -> Result<Option<Task>, FactoryError> {
            let guide: SpeedGuide = dispatch::decode(record)?;
            let stored = guidance.ingest(&guide);
            debug!(vehicle = %guide.veh_id, stored, "speed guide received");
            Ok(None)
        }
    }

    /// Cyclic task applying due guidance every `period` seconds.
    pub fn task(&self, period: Decimal) -> Task {
        let guidance = self.clone();
        Task::cyclic(
            "apply speed guidance",
            None,
            period,
            move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                let (applied, rejected) = guidance.apply_due(ctx.engine, ctx.now);
                Ok(TaskOutcome::Control {
                    success: rejected == 0,
                    detail: format!("{applied} speeds applied, {rejected} rejected"),
                })
            },
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasebridge_core::engine::FixedTimeEngine;
    use phasebridge_types::{GuideInfo, RecordType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn guide(vehicle: &str, entries: &[(Decimal, Decimal)]) -> SpeedGuide {
        SpeedGuide {
            veh_id: vehicle.to_owned(),
            guide_info: entries
                .iter()
                .map(|(time, guide)| GuideInfo {
                    time: *time,
                    guide: *guide,
                })
                .collect(),
        }
    }

    fn at(secs: Decimal) -> SimTime {
        SimTime::from_secs(secs)
    }

    #[test]
    fn guide_values_are_scaled_to_metres_per_second() {
        let guidance = SpeedGuidance::new();
        assert_eq!(guidance.ingest(&guide("v1", &[(dec!(5), dec!(125))])), 1);
        let due = guidance.take_due(at(dec!(5)));
        assert_eq!(
            due,
            vec![AppliedSpeed {
                vehicle_id: "v1".to_owned(),
                speed: dec!(12.5)
            }]
        );
        assert_eq!(guidance.vehicle_count(), 0);
    }

    #[test]
    fn only_latest_due_entry_is_applied() {
        let guidance = SpeedGuidance::new();
        guidance.ingest(&guide(
            "v1",
            &[(dec!(1), dec!(100)), (dec!(2), dec!(80)), (dec!(9), dec!(60))],
        ));
        let due = guidance.take_due(at(dec!(3)));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].speed, dec!(8));
        // The future entry stays pending.
        assert_eq!(guidance.vehicle_count(), 1);
        assert!(guidance.take_due(at(dec!(4))).is_empty());
        assert_eq!(guidance.take_due(at(dec!(9)))[0].speed, dec!(6));
    }

    #[test]
    fn later_records_replace_same_time() {
        let guidance = SpeedGuidance::new();
        guidance.ingest(&guide("v1", &[(dec!(2), dec!(100))]));
        guidance.ingest(&guide("v1", &[(dec!(2), dec!(50))]));
        assert_eq!(guidance.take_due(at(dec!(2)))[0].speed, dec!(5));
    }

    #[test]
    fn negative_guides_are_skipped() {
        let guidance = SpeedGuidance::new();
        assert_eq!(guidance.ingest(&guide("v1", &[(dec!(2), dec!(-10))])), 0);
        assert_eq!(guidance.vehicle_count(), 0);
    }

    #[test]
    fn task_applies_speeds_to_engine() {
        let guidance = SpeedGuidance::new();
        guidance.ingest(&guide("v1", &[(dec!(1), dec!(90))]));
        guidance.ingest(&guide("v2", &[(dec!(3), dec!(40))]));
        let mut engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let mut task = guidance.task(dec!(1));

        engine.step().unwrap();
        let mut ctx = TaskContext {
            now: engine.current_time(),
            engine: &mut engine,
        };
        assert!(task.execute(&mut ctx).unwrap().is_success());

        let commands = engine.speed_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].vehicle_id, "v1");
        assert_eq!(commands[0].speed, dec!(9));
        assert_eq!(guidance.vehicle_count(), 1);
    }

    #[test]
    fn factory_stores_guidance_without_task() {
        let guidance = SpeedGuidance::new();
        let mut factory = guidance.factory();
        let engine = FixedTimeEngine::new(dec!(1)).unwrap();
        let ctx = FactoryContext {
            engine: &engine,
            now: SimTime::ZERO,
        };
        let record = InboundRecord {
            record_type: RecordType::SpeedGuide,
            payload: json!({ "veh_id": "v7", "guide_info": [ { "time": 4, "guide": 110 } ] }),
        };
        assert!(factory(&record, &ctx).unwrap().is_none());
        assert_eq!(guidance.vehicle_count(), 1);

        let malformed = InboundRecord {
            record_type: RecordType::SpeedGuide,
            payload: json!({ "guide_info": 3 }),
        };
        assert!(matches!(
            factory(&malformed, &ctx),
            Err(FactoryError::Malformed { .. })
        ));
    }

    #[test]
    fn clear_drops_everything() {
        let guidance = SpeedGuidance::new();
        let other = guidance.clone();
        guidance.ingest(&guide("v1", &[(dec!(5), dec!(100))]));
        other.clear();
        assert_eq!(guidance.vehicle_count(), 0);
    }
}
