//! Error types for the `phasebridge-control` crate.
//!
//! Topology and mapping errors surface while the controllers are built at
//! startup. [`ExtractError`] and [`SignalError`] surface during a session and
//! are fatal: they mean the engine's programs and the road network disagree.

use phasebridge_core::engine::EngineError;
use phasebridge_types::{ConnectionIndex, ProgramId, TimingMergeError};

/// Errors that can occur while loading a network topology.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Failed to read the topology file from disk.
    #[error("failed to read topology file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse topology YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    /// Two edges share an id.
    #[error("duplicate edge id: {0}")]
    DuplicateEdge(String),

    /// The vehicle reporting radius is not positive.
    #[error("context radius must be positive, got {0}")]
    InvalidContextRadius(rust_decimal::Decimal),
}

impl From<serde_yml::Error> for TopologyError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Errors that can occur while building a movement/connection map.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The node is not in the topology.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node has no signal-controlled connections.
    #[error("node {0} has no connections")]
    NoConnections(String),

    /// A connection references an edge the topology does not contain.
    #[error("connection {connection} at node {node} comes from unknown edge {edge}")]
    EdgeNotFound {
        /// The node being mapped.
        node: String,
        /// The dangling edge id.
        edge: String,
        /// The connection referencing it.
        connection: ConnectionIndex,
    },

    /// An edge shape has fewer than two points, so it has no last segment.
    #[error("edge {edge} has {points} shape point(s), at least 2 are required")]
    DegenerateShape {
        /// The edge id.
        edge: String,
        /// Number of points in its shape.
        points: usize,
    },

    /// A connection carries a turn code the engine does not define.
    #[error("connection {connection} at node {node} has unknown turn code {code:?}")]
    UnknownTurn {
        /// The node being mapped.
        node: String,
        /// The connection.
        connection: ConnectionIndex,
        /// The offending code.
        code: char,
    },

    /// The approach edge starts on the node centre, so it has no bearing.
    #[error("edge {edge} has no bearing relative to node {node}")]
    NoBearing {
        /// The node being mapped.
        node: String,
        /// The edge id.
        edge: String,
    },
    /// The node centre is not a finite coordinate.
    #[error("node {node} has an unusable centre: {source}")]
    InvalidCenter {
        /// The node being mapped.
        node: String,
        /// The conversion error.
        source: rust_decimal::Error,
    },
}

/// Errors that can occur while reconstructing canonical phases.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The program has no subphases.
    #[error("program has no subphases")]
    Empty,

    /// Every subphase belongs to the leading incomplete phase, so there is
    /// no phase to merge it into.
    #[error("program has no green subphase to anchor a phase")]
    NoAnchorPhase,

    /// The leading and trailing partial phases do not add up to a complete
    /// phase.
    #[error("cannot merge leading subphases into the last phase: {source}")]
    Merge {
        /// The underlying merge error.
        #[from]
        source: TimingMergeError,
    },

    /// A phase lacks its green or yellow interval, e.g. a green subphase
    /// followed directly by another green.
    #[error("phase {order} has no {missing} interval")]
    IncompletePhase {
        /// Position of the phase in the cycle, starting at 1.
        order: usize,
        /// The missing interval, `green` or `yellow`.
        missing: &'static str,
    },
}

/// Fatal errors of a signal controller.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The engine failed.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// The traffic light has no program at all.
    #[error("traffic light {tls_id} has no signal program")]
    NoProgram {
        /// The traffic light.
        tls_id: String,
    },

    /// None of the installed programs is the active one.
    #[error("traffic light {tls_id} runs program {active} which is not installed")]
    ProgramIdMismatch {
        /// The traffic light.
        tls_id: String,
        /// The active program id reported by the engine.
        active: ProgramId,
    },

    /// Phase reconstruction failed.
    #[error("cannot reconstruct phases of {tls_id}: {source}")]
    Extract {
        /// The traffic light.
        tls_id: String,
        /// The underlying extraction error.
        source: ExtractError,
    },

    /// A time or duration computation overflowed.
    #[error("arithmetic overflow in signal timing of {tls_id}")]
    Overflow {
        /// The traffic light.
        tls_id: String,
    },

    /// No program id above the existing ones is available.
    #[error("traffic light {tls_id} has exhausted program ids")]
    ProgramIdsExhausted {
        /// The traffic light.
        tls_id: String,
    },
}
