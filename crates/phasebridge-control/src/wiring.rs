//! Assembly of controllers, task factories, and periodic publishers.
//!
//! [`Controllers`] holds one [`SignalController`] per controlled
//! intersection, keyed by the id outside controllers use for it.
//! [`Wiring`] connects them to a session:
//!
//! - inbound `SignalScheme` commands become control tasks of the addressed
//!   intersection;
//! - inbound `SpeedGuide` records feed the shared [`SpeedGuidance`];
//! - inbound `SignalExecutionRequirement` records become one-shot tasks
//!   publishing the current scheme;
//! - every intersection gets cyclic `SignalScheme`, `SignalExecution`,
//!   `SafetyMessage`, and `TrafficFlow` publishers at the configured periods;
//! - when traffic flow is published, one task counts detector arrivals
//!   every step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use phasebridge_core::clock::StepCache;
use phasebridge_core::config::SimulationConfig;
use phasebridge_core::dispatch::{self, FactoryContext, FactoryError, TaskFactoryRegistry};
use phasebridge_core::task::{Task, TaskContext, TaskError, TaskOutcome};
use phasebridge_types::{
    InboundRecord, NodeReferenceId, OutboundRecord, RecordType, SignalExecutionRequirement,
    SignalScheme, SignalSchemeCommand,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::controller::SignalController;
use crate::error::{MapError, SignalError};
use crate::flow::FlowMonitor;
use crate::guidance::SpeedGuidance;
use crate::safety::safety_publisher;
use crate::site::JunctionSite;
use crate::topology::NetworkTopology;

/// Signal controllers of every controlled intersection, with their sites.
#[derive(Debug, Clone, Default)]
pub struct Controllers {
    by_reference: BTreeMap<NodeReferenceId, Arc<SignalController>>,
    sites: BTreeMap<NodeReferenceId, Arc<JunctionSite>>,
}

impl Controllers {
    /// Build a controller for every signalized node of `topology`, or only
    /// for the nodes named in `junction_region` when it is not empty.
    ///
    /// # Errors
    ///
    /// Returns [`MapError`] if a requested node is unknown or any movement
    /// map cannot be built.
    pub fn build(topology: &NetworkTopology, junction_region: &[String]) -> Result<Self, MapError> {
        let node_ids: Vec<&str> = if junction_region.is_empty() {
            topology.signalized_nodes().map(|n| n.id.as_str()).collect()
        } else {
            junction_region.iter().map(String::as_str).collect()
        };

        let mut controllers = Self::default();
        for node_id in node_ids {
            let controller = SignalController::new(topology, node_id)?;
            let site = JunctionSite::from_topology(topology, node_id)?;
            debug!(
                node = node_id,
                reference = %controller.reference(),
                tls = controller.tls_id(),
                detectors = site.detectors().len(),
                "signal controller created"
            );
            controllers
                .sites
                .insert(controller.reference(), Arc::new(site));
            controllers.insert(controller);
        }
        info!(count = controllers.len(), "signal controllers ready");
        Ok(controllers)
    }

    /// Add a controller, replacing one with the same reference id.
    pub fn insert(&mut self, controller: SignalController) {
        self.by_reference
            .insert(controller.reference(), Arc::new(controller));
    }

    /// The controller of an intersection.
    pub fn get(&self, reference: NodeReferenceId) -> Option<&Arc<SignalController>> {
        self.by_reference.get(&reference)
    }

    /// Site of an intersection built from the topology.
    pub fn site(&self, reference: NodeReferenceId) -> Option<&Arc<JunctionSite>> {
        self.sites.get(&reference)
    }

    /// Every site, ordered by reference id.
    pub fn sites(&self) -> impl Iterator<Item = &Arc<JunctionSite>> {
        self.sites.values()
    }

    /// Every controller, ordered by reference id.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SignalController>> {
        self.by_reference.values()
    }

    /// Number of controlled intersections.
    pub fn len(&self) -> usize {
        self.by_reference.len()
    }

    /// Whether no intersection is controlled.
    pub fn is_empty(&self) -> bool {
        self.by_reference.is_empty()
    }

    /// The controller a record addresses. With no node id, the only
    /// controller if there is exactly one.
    fn resolve(&self, node_id: Option<NodeReferenceId>) -> Option<&Arc<SignalController>> {
        match node_id {
            Some(reference) => self.get(reference),
            None if self.len() == 1 => self.iter().next(),
            None => None,
        }
    }
}

/// Scheme of one intersection, computed at most once per simulated time.
type SchemeCache = Arc<Mutex<StepCache<SignalScheme>>>;

/// Connects controllers, guidance, and flow counting to a session.
#[derive(Debug, Clone)]
pub struct Wiring {
    controllers: Arc<Controllers>,
    guidance: SpeedGuidance,
    flow: FlowMonitor,
    scheme_caches: Arc<BTreeMap<NodeReferenceId, SchemeCache>>,
}

impl Wiring {
    /// Wire `controllers` with an empty speed guidance store and no flow
    /// counts.
    pub fn new(controllers: Controllers) -> Self {
        let scheme_caches = controllers
            .iter()
            .map(|c| (c.reference(), SchemeCache::default()))
            .collect();
        Self {
            controllers: Arc::new(controllers),
            guidance: SpeedGuidance::new(),
            flow: FlowMonitor::new(),
            scheme_caches: Arc::new(scheme_caches),
        }
    }

    /// The controlled intersections.
    pub fn controllers(&self) -> &Controllers {
        &self.controllers
    }

    /// The shared speed guidance store.
    pub const fn guidance(&self) -> &SpeedGuidance {
        &self.guidance
    }

    /// Register the factories of every handled inbound record type.
    pub fn register_factories(&self, registry: &mut TaskFactoryRegistry) {
        registry.register(RecordType::SignalScheme, self.scheme_command_factory());
        registry.register(RecordType::SpeedGuide, self.guidance.factory());
        registry.register(
            RecordType::SignalExecutionRequirement,
            self.requirement_factory(),
        );
    }

    /// The shared detector flow counters.
    pub const fn flow(&self) -> &FlowMonitor {
        &self.flow
    }

    /// Cyclic tasks of a session: detector counting every step when traffic
    /// flow is published, per-intersection publishers at the configured
    /// periods, plus speed guidance every step.
    pub fn periodic_tasks(&self, config: &SimulationConfig) -> Vec<Task> {
        let mut tasks = Vec::new();
        let step_length = config.simulation.step_length;
        let scheme_period = config.publish_period(RecordType::SignalScheme);
        let execution_period = config.publish_period(RecordType::SignalExecution);
        let safety_period = config.publish_period(RecordType::SafetyMessage);
        let flow_period = config.publish_period(RecordType::TrafficFlow);

        // Counting runs before the publishers that read it at the same time.
        let detectors: BTreeSet<String> = self
            .controllers
            .sites()
            .flat_map(|site| site.detectors().iter().cloned())
            .collect();
        if flow_period.is_some() && !detectors.is_empty() {
            tasks.push(self.flow.count_task(detectors.into_iter().collect(), step_length));
        }

        for controller in self.controllers.iter() {
            if let Some(period) = scheme_period {
                tasks.push(self.scheme_publisher(controller, Some(period)));
            }
            if let Some(period) = execution_period {
                tasks.push(execution_publisher(controller, period));
            }
            let Some(site) = self.controllers.site(controller.reference()) else {
                continue;
            };
            if let Some(period) = safety_period {
                tasks.push(safety_publisher(site, period));
            }
            if let Some(period) = flow_period {
                tasks.push(self.flow.publisher(site, period));
            }
        }
        tasks.push(self.guidance.task(step_length));
        debug!(count = tasks.len(), "periodic tasks created");
        tasks
    }

    /// Forget per-session state: pending guidance, flow counts, and cached
    /// schemes.
    pub fn reset(&self) {
        self.guidance.clear();
        self.flow.clear();
        for cache in self.scheme_caches.values() {
            lock_cache(cache).invalidate();
        }
    }

    fn scheme_command_factory(
        &self,
    ) -> impl FnMut(&InboundRecord, &FactoryContext<'_>) -> Result<Option<Task>, FactoryError> + Send + 'static
    {
        let controllers = Arc::clone(&self.controllers);
        move |record: &InboundRecord, ctx: &FactoryContext<'_>| -> Result<Option<Task>, FactoryError> {
            let command: SignalSchemeCommand = dispatch::decode(record)?;
            let Some(controller) = controllers.resolve(command.node_id) else {
                debug!(node = ?command.node_id, "signal scheme for an uncontrolled intersection, dropping");
                return Ok(None);
            };
            controller
                .create_control_task(ctx.engine, &command)
                .map_err(|err| FactoryError::fatal(RecordType::SignalScheme, err))
        }
    }

    fn requirement_factory(
        &self,
    ) -> impl FnMut(&InboundRecord, &FactoryContext<'_>) -> Result<Option<Task>, FactoryError> + Send + 'static
    {
        let wiring = self.clone();
        move |record: &InboundRecord, _ctx: &FactoryContext<'_>| -> Result<Option<Task>, FactoryError> {
            let requirement: SignalExecutionRequirement = dispatch::decode(record)?;
            let Some(controller) = wiring.controllers.resolve(requirement.node_id) else {
                info!(node = ?requirement.node_id, "execution requirement names no controlled intersection, dropping");
                return Ok(None);
            };
            Ok(Some(wiring.scheme_publisher(controller, None)))
        }
    }

    /// Task publishing the current scheme of `controller`: cyclic with
    /// `period`, or once at the next drain without one.
    fn scheme_publisher(&self, controller: &Arc<SignalController>, period: Option<Decimal>) -> Task {
        let reference = controller.reference();
        let controller = Arc::clone(controller);
        let cache = self
            .scheme_caches
            .get(&reference)
            .map_or_else(SchemeCache::default, Arc::clone);
        let label = format!("publish SignalScheme of {reference}");
        let task_label = label.clone();
        let action = move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
            let mut cache = lock_cache(&cache);
            let scheme = cache
                .get_or_try_insert_with(ctx.now, || controller.current_scheme(&*ctx.engine))
                .map_err(|err| failed(&task_label, &err))?;
            let record = OutboundRecord::encode(RecordType::SignalScheme, ctx.now, scheme)?;
            Ok(TaskOutcome::produced(record))
        };
        match period {
            Some(period) => Task::cyclic(label, None, period, action),
            None => Task::one_shot(label, None, action),
        }
    }
}

/// Cyclic task publishing which phase of `controller` is running.
fn execution_publisher(controller: &Arc<SignalController>, period: Decimal) -> Task {
    let controller = Arc::clone(controller);
    let label = format!("publish SignalExecution of {}", controller.reference());
    let task_label = label.clone();
    Task::cyclic(
        label,
        None,
        period,
        move |ctx: &mut TaskContext<'_>| -> Result<TaskOutcome, TaskError> {
            let execution = controller
                .execution_snapshot(&*ctx.engine)
                .map_err(|err| failed(&task_label, &err))?;
            let record = OutboundRecord::encode(RecordType::SignalExecution, ctx.now, &execution)?;
            Ok(TaskOutcome::produced(record))
        },
    )
}

fn failed(label: &str, err: &SignalError) -> TaskError {
    TaskError::Failed {
        label: label.to_owned(),
        reason: err.to_string(),
    }
}

fn lock_cache(cache: &SchemeCache) -> std::sync::MutexGuard<'_, StepCache<SignalScheme>> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
