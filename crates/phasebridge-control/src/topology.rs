//! Road network topology: junction nodes, approach edges, and the
//! signal-controlled connections through each junction.
//!
//! The topology is loaded once at startup (from YAML exported alongside the
//! engine's network) and injected into every controller. Only the geometry
//! needed to tell approach directions apart is kept: node centres and edge
//! shapes. Each junction may list the lane-area detectors counting its
//! approach traffic. The file may also carry the signal program each traffic
//! light starts with.

use std::collections::BTreeMap;
use std::path::Path;

use phasebridge_types::{ConnectionIndex, NodeReferenceId, ProgramLogic};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::TopologyError;

/// A point in network coordinates (metres, y pointing north).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
}

impl Point {
    /// Construct a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One signal-controlled connection through a junction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Connection {
    /// Id of the incoming edge.
    pub from_edge: String,
    /// Engine turn code (`s`, `l`, `r`, `t`, `L`, `R`).
    pub dir: char,
    /// Signal group index within the traffic light.
    pub link_index: ConnectionIndex,
    /// Traffic light controlling this connection.
    pub tls: String,
}

/// A junction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Node {
    /// Engine junction id.
    pub id: String,
    /// Id of the junction in outside controllers' numbering.
    pub reference: NodeReferenceId,
    /// Junction centre.
    pub center: Point,
    /// Signal-controlled connections; empty for unsignalized junctions.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Engine ids of the lane-area detectors on this junction's approaches.
    #[serde(default)]
    pub detectors: Vec<String>,
}

/// Vehicles within this many metres of a junction centre are reported with
/// that junction.
pub const DEFAULT_CONTEXT_RADIUS: Decimal = Decimal::ONE_HUNDRED;

const fn default_context_radius() -> Decimal {
    DEFAULT_CONTEXT_RADIUS
}

/// A road segment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Edge {
    /// Engine edge id.
    pub id: String,
    /// Polyline from the upstream end to the downstream end.
    pub shape: Vec<Point>,
}

#[derive(Deserialize)]
struct TopologyFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    signal_programs: BTreeMap<String, ProgramLogic>,
    #[serde(default = "default_context_radius")]
    context_radius: Decimal,
}

/// The road network, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    signal_programs: BTreeMap<String, ProgramLogic>,
    context_radius: Decimal,
}

impl NetworkTopology {
    /// Load a topology from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Io`] if the file cannot be read, or any
    /// error of [`parse`](Self::parse).
    pub fn from_file(path: &Path) -> Result<Self, TopologyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a topology from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Yaml`] for malformed YAML,
    /// [`TopologyError::InvalidContextRadius`] for a non-positive radius, and
    /// the duplicate errors of [`from_parts`](Self::from_parts).
    pub fn parse(yaml: &str) -> Result<Self, TopologyError> {
        let file: TopologyFile = serde_yml::from_str(yaml)?;
        if file.context_radius <= Decimal::ZERO {
            return Err(TopologyError::InvalidContextRadius(file.context_radius));
        }
        let mut topology = Self::from_parts(file.nodes, file.edges)?;
        topology.signal_programs = file.signal_programs;
        topology.context_radius = file.context_radius;
        Ok(topology)
    }

    /// Index nodes and edges.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DuplicateNode`] or
    /// [`TopologyError::DuplicateEdge`] when an id repeats.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, TopologyError> {
        let mut topology = Self {
            context_radius: DEFAULT_CONTEXT_RADIUS,
            ..Self::default()
        };
        for node in nodes {
            if topology.nodes.contains_key(&node.id) {
                return Err(TopologyError::DuplicateNode(node.id));
            }
            topology.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            if topology.edges.contains_key(&edge.id) {
                return Err(TopologyError::DuplicateEdge(edge.id));
            }
            topology.edges.insert(edge.id.clone(), edge);
        }
        Ok(topology)
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up an edge.
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Every node, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes with at least one signal-controlled connection, ordered by id.
    pub fn signalized_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| !n.connections.is_empty())
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Initial signal program of every traffic light listed in the file,
    /// keyed by traffic light id.
    pub const fn signal_programs(&self) -> &BTreeMap<String, ProgramLogic> {
        &self.signal_programs
    }

    /// Radius in metres around a junction centre within which vehicles are
    /// reported with the junction.
    pub const fn context_radius(&self) -> Decimal {
        self.context_radius
    }

    /// Every detector id listed by any node.
    pub fn detector_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .values()
            .flat_map(|n| n.detectors.iter().map(String::as_str))
    }
}
