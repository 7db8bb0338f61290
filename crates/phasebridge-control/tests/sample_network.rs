//! The sample road network shipped at the workspace root loads and
//! translates into a canonical scheme.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use phasebridge_control::{Controllers, NetworkTopology};
use phasebridge_core::engine::FixedTimeEngine;
use rust_decimal_macros::dec;

#[test]
fn sample_network_translates() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("topology.yaml");
    if !path.exists() {
        return;
    }
    let topology = NetworkTopology::from_file(&path).unwrap();
    let controllers = Controllers::build(&topology, &[]).unwrap();
    assert_eq!(controllers.len(), 1);
    assert_eq!(topology.detector_ids().count(), 4);

    let mut engine = FixedTimeEngine::new(dec!(1)).unwrap();
    for (tls_id, logic) in topology.signal_programs() {
        engine.add_traffic_light(tls_id, logic.clone()).unwrap();
    }

    let controller = controllers.iter().next().unwrap();
    let scheme = controller.current_scheme(&engine).unwrap();
    assert_eq!(scheme.phases.len(), 3);
    assert_eq!(scheme.cycle, dec!(85));
    assert_eq!(scheme.phases[0].movements, vec!["2", "8"]);
}
