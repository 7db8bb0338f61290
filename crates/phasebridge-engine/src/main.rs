//! Signal coordinator binary for PhaseBridge.
//!
//! This is the main entry point that wires together the road network,
//! the per-intersection signal controllers, the NATS channel, and the
//! session step loop. It loads configuration, initializes all subsystems,
//! and runs the session until a termination condition is met.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `phasebridge-config.yaml` (or the path given
//!    as first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Load the road network and build one controller per intersection
//! 4. Create the engine and install each traffic light's initial program
//! 5. Connect to NATS and start forwarding inbound records
//! 6. Assemble the session: factories, periodic publishers, sink
//! 7. Run the session loop (Ctrl-C requests a stop)
//! 8. Log the result

mod error;
mod nats_channel;
mod step_log;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use phasebridge_control::{Controllers, NetworkTopology, Wiring};
use phasebridge_core::config::{LoggingConfig, SimulationConfig};
use phasebridge_core::control::SessionControl;
use phasebridge_core::dispatch::TaskFactoryRegistry;
use phasebridge_core::engine::FixedTimeEngine;
use phasebridge_core::inbox::Inbox;
use phasebridge_core::runner;
use phasebridge_core::step::Session;
use phasebridge_types::{SessionId, SimTime};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineBinError;
use crate::nats_channel::NatsChannel;
use crate::step_log::StepLog;

/// Config file looked up in the working directory when no path is given.
const DEFAULT_CONFIG_PATH: &str = "phasebridge-config.yaml";

/// Steps between two progress lines in the log.
const PROGRESS_EVERY_STEPS: u64 = 600;

/// Application entry point for the signal coordinator.
///
/// # Errors
///
/// Returns an error if any initialization step or the session itself fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    let session_id = SessionId::new();
    info!(
        %session_id,
        config = %config_path.display(),
        step_length = %config.simulation.step_length,
        time_limit = ?config.simulation.time_limit,
        warm_up_time = %config.simulation.warm_up_time,
        "phasebridge-engine starting"
    );

    // 3. Road network and controllers.
    let topology = NetworkTopology::from_file(&config.topology.path)
        .map_err(EngineBinError::from)
        .with_context(|| format!("loading topology {}", config.topology.path.display()))?;
    let controllers = Controllers::build(&topology, &config.simulation.junction_region)
        .map_err(EngineBinError::from)?;
    info!(
        nodes = topology.node_count(),
        controllers = controllers.len(),
        "Road network loaded"
    );

    // 4. Engine with every traffic light's initial program.
    let mut engine = build_engine(&config, &topology, &controllers)?;

    // 5. Messaging.
    info!(nats_url = %config.connection.nats_url, "Connecting to NATS");
    let channel = NatsChannel::connect(&config.connection).await?;
    let (inbox_sender, inbox) = Inbox::channel(config.connection.inbound_queue_capacity);
    let _inbound_handle = channel.forward_inbound(inbox_sender).await?;
    let sink = channel.sink()?;
    info!("NATS channel ready");

    // 6. Session assembly.
    let wiring = Wiring::new(controllers);
    let mut factories = TaskFactoryRegistry::new();
    wiring.register_factories(&mut factories);
    let mut session = Session::new(
        inbox,
        factories,
        Arc::new(sink),
        SimTime::from_secs(config.simulation.warm_up_time),
    );
    for task in wiring.periodic_tasks(&config) {
        session.add_task(task).map_err(EngineBinError::from)?;
    }
    info!(
        tasks = session.scheduler().len(),
        "Session assembled, entering step loop"
    );

    // 7. Run the session.
    let control = Arc::new(SessionControl::new(&config.simulation));
    spawn_interrupt_handler(Arc::clone(&control));
    let mut callback = StepLog::new(PROGRESS_EVERY_STEPS);
    let result = runner::run_session(
        &mut session,
        &mut engine,
        &control,
        config.simulation.await_start,
        &mut callback,
    )
    .await;
    wiring.reset();
    let result = result.map_err(EngineBinError::from)?;

    // 8. Log results.
    runner::log_session_end(&result);
    info!(
        %session_id,
        end_reason = ?result.end_reason,
        total_steps = result.total_steps,
        elapsed_seconds = control.elapsed_seconds(),
        "phasebridge-engine shutdown complete"
    );

    Ok(())
}

/// Load the configuration file, falling back to defaults when it does not
/// exist.
fn load_config(path: &Path) -> Result<SimulationConfig, EngineBinError> {
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        let mut config = SimulationConfig::default();
        config.connection.apply_env_overrides();
        Ok(config)
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Create the in-memory engine and install the initial program of every
/// controlled traffic light.
fn build_engine(
    config: &SimulationConfig,
    topology: &NetworkTopology,
    controllers: &Controllers,
) -> anyhow::Result<FixedTimeEngine> {
    let mut engine =
        FixedTimeEngine::new(config.simulation.step_length).map_err(EngineBinError::from)?;
    for (tls_id, logic) in topology.signal_programs() {
        engine
            .add_traffic_light(tls_id, logic.clone())
            .map_err(EngineBinError::from)?;
    }
    for detector in topology.detector_ids() {
        engine.add_detector(detector);
    }
    for controller in controllers.iter() {
        let tls_id = controller.tls_id();
        anyhow::ensure!(
            topology.signal_programs().contains_key(tls_id),
            "traffic light {tls_id} of intersection {} has no initial signal program",
            controller.reference()
        );
    }
    info!(
        traffic_lights = topology.signal_programs().len(),
        detectors = topology.detector_ids().count(),
        "Engine initialized"
    );
    Ok(engine)
}

/// Request a stop when the process receives Ctrl-C.
fn spawn_interrupt_handler(control: Arc<SessionControl>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping session");
                control.request_stop();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}
