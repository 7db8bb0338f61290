//! Detector traffic volumes.
//!
//! A cyclic task reads every lane-area detector each step and counts the
//! vehicles it sees that it did not see the step before. Per-intersection
//! publishers hand out the counts at their own period and restart the
//! counting interval of the detectors they report.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use phasebridge_core::engine::{EngineError, SignalEngine};
use phasebridge_core::task::{Task, TaskContext, TaskError, TaskOutcome};
use phasebridge_types::{LaneFlow, OutboundRecord, RecordType, SimTime, TrafficFlow};
use rust_decimal::Decimal;
use tracing::debug;

use crate::site::JunctionSite;

/// Shortest counting interval worth reporting, in seconds.
const MIN_FLOW_PERIOD: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Running count of one detector.
#[derive(Debug, Default)]
struct FlowCounter {
    volume: u32,
    last_seen: BTreeSet<String>,
    started_at: Option<SimTime>,
}

impl FlowCounter {
    fn observe(&mut self, now: SimTime, seen: BTreeSet<String>) {
        self.started_at.get_or_insert(now);
        let arrivals = seen.difference(&self.last_seen).count();
        self.volume = self
            .volume
            .saturating_add(u32::try_from(arrivals).unwrap_or(u32::MAX));
        self.last_seen = seen;
    }

    /// Volume and length of the interval ending at `now`, restarting the
    /// interval. `None` while no interval has run long enough.
    fn take(&mut self, now: SimTime) -> Option<(u32, Decimal)> {
        let period = now.checked_since(self.started_at?)?;
        if period < MIN_FLOW_PERIOD {
            return None;
        }
        self.started_at = None;
        Some((std::mem::take(&mut self.volume), period))
    }
}

/// Detector counters shared between the counting task and the publishers.
///
/// Cloning is cheap and every clone sees the same counters.
#[derive(Debug, Clone, Default)]
pub struct FlowMonitor {
    inner: Arc<Mutex<BTreeMap<String, FlowCounter>>>,
}

impl FlowMonitor {
    /// A monitor with no counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, BTreeMap<String, FlowCounter>> {
        match self.inner.lock() {
            Ok(counters) => counters,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read every detector in `detectors` from the engine and count new
    /// arrivals.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for a detector it cannot read.
    pub fn observe(
        &self,
        engine: &dyn SignalEngine,
        now: SimTime,
        detectors: &[String],
    ) -> Result<(), EngineError> {
        let mut readings = Vec::with_capacity(detectors.len());
        for detector in detectors {
            readings.push((detector, engine.detector_vehicles(detector)?));
        }
        let mut counters = self.counters();
        for (detector, seen) in readings {
            counters.entry(detector.clone()).or_default().observe(now, seen);
        }
        Ok(())
    }

    /// Volumes of `detectors` since their last report. Detectors never
    /// observed, or observed too briefly, are left out.
    pub fn take_flows(&self, now: SimTime, detectors: &[String]) -> Vec<LaneFlow> {
        let mut counters = self.counters();
        let mut flows = Vec::with_capacity(detectors.len());
        for detector in detectors {
            let Some((volume, period)) = counters.get_mut(detector).and_then(|c| c.take(now)) else {
                debug!(detector = %detector, %now, "no completed counting interval");
                continue;
            };
            flows.push(LaneFlow {
                detector_id: detector.clone(),
                volume,
                period,
            });
        }
        flows
    }

    /// Drop every counter.
    pub fn clear(&self) {
        self.counters().clear();
    }

    /// Cyclic task observing `detectors` every `period` seconds.
    pub fn count_task(&self, detectors: Vec<String>, period: Decimal) -> Task {
        let monitor = self.clone();
        Task::cyclic(
            "count detector flow",
            None,
            period,
            move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                monitor.observe(&*ctx.engine, ctx.now, &detectors)?;
                Ok(TaskOutcome::applied(format!("{} detectors read", detectors.len())))
            },
        )
    }

    /// Cyclic task publishing the volumes of `site`'s detectors.
    pub fn publisher(&self, site: &Arc<JunctionSite>, period: Decimal) -> Task {
        let monitor = self.clone();
        let site = Arc::clone(site);
        let label = format!("publish TrafficFlow of {}", site.reference());
        Task::cyclic(
            label,
            None,
            period,
            move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
                let stats = monitor.take_flows(ctx.now, site.detectors());
                if stats.is_empty() {
                    debug!(node = %site.reference(), "no detector completed a counting interval");
                }
                let flow = TrafficFlow {
                    node_id: site.reference(),
                    stats,
                };
                let record = OutboundRecord::encode(RecordType::TrafficFlow, ctx.now, &flow)?;
                Ok(TaskOutcome::produced(record))
            },
        )
    }
}
