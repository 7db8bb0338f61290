//! Signal phase translation for the PhaseBridge signal coordinator.
//!
//! This crate knows about the road network and traffic lights: it maps the
//! engine's per-connection signal programs to canonical, movement-oriented
//! signal schemes and back, and wires that translation into the
//! scheduler of `phasebridge-core`.
//!
//! # Modules
//!
//! - [`topology`] -- Junctions, approach edges, and signal-controlled
//!   connections, loaded from YAML.
//! - [`geometry`] -- Approach bearings and compass sectors.
//! - [`movement_map`] -- [`MovementConnectionMap`]: movement to connection
//!   relation of one intersection.
//! - [`phase_gather`] -- Reconstruction of canonical phases from a flat
//!   subphase cycle.
//! - [`controller`] -- [`SignalController`]: scheme snapshots, execution
//!   snapshots, and control tasks for one intersection.
//! - [`guidance`] -- Vehicle speed guidance store and applying task.
//! - [`site`] -- [`JunctionSite`]: reporting area and detectors of one
//!   intersection.
//! - [`safety`] -- Safety messages of the vehicles around an intersection.
//! - [`flow`] -- Detector arrival counting and traffic flow reports.
//! - [`wiring`] -- Task factories and periodic publishers for a session.
//! - [`error`] -- Error types of the above.
//!
//! [`MovementConnectionMap`]: movement_map::MovementConnectionMap
//! [`SignalController`]: controller::SignalController
//! [`JunctionSite`]: site::JunctionSite

pub mod controller;
pub mod error;
pub mod flow;
pub mod geometry;
pub mod guidance;
pub mod movement_map;
pub mod phase_gather;
pub mod safety;
pub mod site;
pub mod topology;
pub mod wiring;

pub use controller::SignalController;
pub use flow::FlowMonitor;
pub use guidance::SpeedGuidance;
pub use movement_map::MovementConnectionMap;
pub use site::JunctionSite;
pub use topology::NetworkTopology;
pub use wiring::{Controllers, Wiring};
