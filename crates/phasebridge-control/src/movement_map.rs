//! The relation between standardized movements and the engine's signal
//! groups at one intersection.
//!
//! Each signal-controlled connection is classified by the direction of its
//! approach edge and its turn. The approach direction comes from the bearing
//! of the start of the edge's last shape segment, seen from the junction
//! centre. Several connections (lanes) usually map to one movement.

use std::collections::{BTreeMap, BTreeSet};

use phasebridge_types::{ConnectionIndex, Direction, Movement, NodeReferenceId, Turn};
use tracing::{debug, warn};

use crate::error::MapError;
use crate::geometry;
use crate::topology::NetworkTopology;

/// How one connection enters the intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct Approach {
    /// Incoming edge id.
    pub edge: String,
    /// Compass bearing of the approach from the junction centre.
    pub bearing: f64,
    /// Approach direction used for movement lookup.
    pub primary: Direction,
    /// Neighbouring direction for skewed approaches.
    pub secondary: Option<Direction>,
    /// Turn code as the engine reports it.
    pub turn: Turn,
}

/// Movement/connection relation of one intersection.
#[derive(Debug, Clone)]
pub struct MovementConnectionMap {
    node_id: String,
    reference: NodeReferenceId,
    tls_id: String,
    by_movement: BTreeMap<Movement, BTreeSet<ConnectionIndex>>,
    by_connection: BTreeMap<ConnectionIndex, Movement>,
    approaches: BTreeMap<ConnectionIndex, Approach>,
}

impl MovementConnectionMap {
    /// Build the map of `node_id` from the topology.
    ///
    /// # Errors
    ///
    /// Returns [`MapError`] if the node is unknown or has no connections, or
    /// a connection references an edge that is missing, degenerate, or
    /// starts on the junction centre, or carries an unknown turn code.
    pub fn build(topology: &NetworkTopology, node_id: &str) -> Result<Self, MapError> {
        let node = topology
            .node(node_id)
            .ok_or_else(|| MapError::NodeNotFound(node_id.to_owned()))?;
        let tls_id = node
            .connections
            .first()
            .map(|c| c.tls.clone())
            .ok_or_else(|| MapError::NoConnections(node_id.to_owned()))?;

        let mut map = Self {
            node_id: node_id.to_owned(),
            reference: node.reference,
            tls_id,
            by_movement: BTreeMap::new(),
            by_connection: BTreeMap::new(),
            approaches: BTreeMap::new(),
        };

        for conn in &node.connections {
            let edge = topology
                .edge(&conn.from_edge)
                .ok_or_else(|| MapError::EdgeNotFound {
                    node: node_id.to_owned(),
                    edge: conn.from_edge.clone(),
                    connection: conn.link_index,
                })?;
            let last_segment_start = edge
                .shape
                .len()
                .checked_sub(2)
                .and_then(|i| edge.shape.get(i))
                .ok_or_else(|| MapError::DegenerateShape {
                    edge: edge.id.clone(),
                    points: edge.shape.len(),
                })?;
            let bearing = geometry::bearing(node.center, *last_segment_start).ok_or_else(|| {
                MapError::NoBearing {
                    node: node_id.to_owned(),
                    edge: edge.id.clone(),
                }
            })?;
            let turn = Turn::from_code(conn.dir).ok_or(MapError::UnknownTurn {
                node: node_id.to_owned(),
                connection: conn.link_index,
                code: conn.dir,
            })?;
            let (primary, secondary) = geometry::directions(bearing);

            if conn.tls != map.tls_id {
                warn!(
                    node = node_id,
                    connection = %conn.link_index,
                    tls = %conn.tls,
                    expected = %map.tls_id,
                    "connection controlled by a different traffic light"
                );
            }

            match Movement::from_parts(primary, turn.normalized()) {
                Some(movement) => {
                    map.by_movement
                        .entry(movement)
                        .or_default()
                        .insert(conn.link_index);
                    map.by_connection.insert(conn.link_index, movement);
                }
                None => warn!(node = node_id, ?primary, ?turn, "no movement for approach"),
            }
            map.approaches.insert(
                conn.link_index,
                Approach {
                    edge: edge.id.clone(),
                    bearing,
                    primary,
                    secondary,
                    turn,
                },
            );
        }

        debug!(
            node = node_id,
            tls = %map.tls_id,
            movements = map.by_movement.len(),
            connections = map.by_connection.len(),
            "movement map built"
        );
        Ok(map)
    }

    /// Connections released for `movement`, or `None` when the movement has
    /// no approach at this intersection.
    pub fn connections_for_movement(&self, movement: Movement) -> Option<&BTreeSet<ConnectionIndex>> {
        self.by_movement.get(&movement)
    }

    /// Movements served by any of `indices`. Unmapped indices are ignored.
    pub fn movements_for_connections<'a>(
        &self,
        indices: impl IntoIterator<Item = &'a ConnectionIndex>,
    ) -> BTreeSet<Movement> {
        indices
            .into_iter()
            .filter_map(|i| self.by_connection.get(i).copied())
            .collect()
    }

    /// Width of a signal state for this intersection: highest connection
    /// index plus one.
    pub fn connection_count(&self) -> usize {
        self.approaches
            .keys()
            .next_back()
            .map_or(0, |c| c.as_usize().saturating_add(1))
    }

    /// How `connection` enters the intersection.
    pub fn approach(&self, connection: ConnectionIndex) -> Option<&Approach> {
        self.approaches.get(&connection)
    }

    /// Engine junction id.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Junction id in outside controllers' numbering.
    pub const fn reference(&self) -> NodeReferenceId {
        self.reference
    }

    /// Traffic light controlling the intersection.
    pub fn tls_id(&self) -> &str {
        &self.tls_id
    }
}
