//! The surroundings of a controlled intersection: the area whose vehicles are
//! reported with it and the detectors counting its approach traffic.

use phasebridge_core::engine::VehicleState;
use phasebridge_types::NodeReferenceId;
use rust_decimal::Decimal;

use crate::error::MapError;
use crate::topology::NetworkTopology;

/// Reporting area and detectors of one intersection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionSite {
    reference: NodeReferenceId,
    center_x: Decimal,
    center_y: Decimal,
    radius: Decimal,
    detectors: Vec<String>,
}

impl JunctionSite {
    /// Site of `node_id`, using the topology's context radius.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::NodeNotFound`] for an unknown node and
    /// [`MapError::InvalidCenter`] if its centre is not finite.
    pub fn from_topology(topology: &NetworkTopology, node_id: &str) -> Result<Self, MapError> {
        let node = topology
            .node(node_id)
            .ok_or_else(|| MapError::NodeNotFound(node_id.to_owned()))?;
        let invalid = |source| MapError::InvalidCenter {
            node: node_id.to_owned(),
            source,
        };
        Ok(Self {
            reference: node.reference,
            center_x: Decimal::try_from(node.center.x).map_err(invalid)?,
            center_y: Decimal::try_from(node.center.y).map_err(invalid)?,
            radius: topology.context_radius(),
            detectors: node.detectors.clone(),
        })
    }

    /// The intersection's id in outside controllers' numbering.
    pub const fn reference(&self) -> NodeReferenceId {
        self.reference
    }

    /// Detectors on the intersection's approaches.
    pub fn detectors(&self) -> &[String] {
        &self.detectors
    }

    /// Whether `vehicle` is within the reporting radius. Distances that
    /// overflow count as outside.
    pub fn contains(&self, vehicle: &VehicleState) -> bool {
        let squared = |d: Decimal| d.checked_mul(d);
        let distance = vehicle
            .x
            .checked_sub(self.center_x)
            .and_then(squared)
            .zip(vehicle.y.checked_sub(self.center_y).and_then(squared))
            .and_then(|(dx, dy)| dx.checked_add(dy));
        match (distance, squared(self.radius)) {
            (Some(distance), Some(limit)) => distance <= limit,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::movement_map::tests::crossroads;

    pub(crate) fn vehicle_at(id: &str, x: Decimal, y: Decimal) -> VehicleState {
        VehicleState {
            id: id.to_owned(),
            x,
            y,
            speed: dec!(8),
            acceleration: dec!(-0.5),
            heading: dec!(180),
            length: dec!(5),
            width: dec!(1.8),
            vehicle_class: "passenger".to_owned(),
            edge_id: "n_in".to_owned(),
            lane_id: "n_in_0".to_owned(),
            lane_index: 0,
        }
    }

    #[test]
    fn site_takes_reference_and_detectors() {
        let site = JunctionSite::from_topology(&crossroads(), "J1").unwrap();
        assert_eq!(site.reference(), NodeReferenceId { region: 1, id: 101 });
        assert_eq!(site.detectors(), ["e2_n_in_0", "e2_s_in_0"]);
    }

    #[test]
    fn unknown_node_is_rejected() {
        assert!(matches!(
            JunctionSite::from_topology(&crossroads(), "J9"),
            Err(MapError::NodeNotFound(_))
        ));
    }

    #[test]
    fn radius_bounds_the_area() {
        let site = JunctionSite::from_topology(&crossroads(), "J1").unwrap();
        assert!(site.contains(&vehicle_at("a", dec!(0), dec!(99))));
        assert!(site.contains(&vehicle_at("b", dec!(60), dec!(-80))));
        assert!(!site.contains(&vehicle_at("c", dec!(60), dec!(80.1))));
        assert!(!site.contains(&vehicle_at("d", dec!(-250), dec!(0))));
    }
}
