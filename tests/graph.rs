mod common;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use waypoint_traffic::{
    config::{SceneConfig, SimulationConfig, VehicleType, WaypointRecord},
    simulation::{GraphError, GraphLoadPolicy, Point, Vec3, WaypointGraph, WaypointId},
};

use common::{lane, waypoint};

#[test]
fn test_demo_scene_neighbors_and_prev_agree() -> Result<()> {
    let config = SimulationConfig::load_from_files("scene.toml", "vehicles.toml")?;
    let graph = WaypointGraph::from_records(&config.scene.waypoints, GraphLoadPolicy::Strict)?;

    assert!(graph.check_symmetry().is_empty());
    for a in graph.ids() {
        for &b in graph.neighbors(a) {
            assert!(graph.prev(b).contains(&a), "{} -> {} has no back link", a.0, b.0);
        }
        for &b in graph.prev(a) {
            assert!(graph.neighbors(b).contains(&a), "{} <- {} has no forward link", a.0, b.0);
        }
    }
    Ok(())
}

#[test]
fn test_strict_load_rejects_asymmetric_graph() {
    let mut records = lane(3, 10.0);
    records[1].prev.clear();

    let result = WaypointGraph::from_records(&records, GraphLoadPolicy::Strict);
    assert_eq!(result.err(), Some(GraphError::MissingPrev { from: 0, to: 1 }));
}

#[test]
fn test_trust_load_keeps_asymmetric_graph() -> Result<()> {
    let mut records = lane(3, 10.0);
    records[1].prev.clear();

    let graph = WaypointGraph::from_records(&records, GraphLoadPolicy::Trust)?;
    assert_eq!(graph.neighbors(WaypointId(0)), &[WaypointId(1)]);
    assert!(graph.prev(WaypointId(1)).is_empty());
    assert_eq!(graph.check_symmetry(), vec![GraphError::MissingPrev { from: 0, to: 1 }]);
    Ok(())
}

#[test]
fn test_dangling_index_handling() -> Result<()> {
    let mut records = lane(3, 10.0);
    records[2].neighbors.push(7);

    match WaypointGraph::from_records(&records, GraphLoadPolicy::Strict) {
        Err(GraphError::DanglingIndex { from, to, list, len }) => {
            assert_eq!((from, to, list, len), (2, 7, "neighbors", 3));
        }
        other => panic!("expected a dangling index error, got {:?}", other.map(|g| g.len())),
    }

    let graph = WaypointGraph::from_records(&records, GraphLoadPolicy::Trust)?;
    assert!(graph.neighbors(WaypointId(2)).is_empty());
    Ok(())
}

#[test]
fn test_empty_graph_is_an_error() {
    for policy in [GraphLoadPolicy::Strict, GraphLoadPolicy::Trust] {
        let result = WaypointGraph::from_records(&[], policy);
        assert_eq!(result.err(), Some(GraphError::Empty));
    }
}

/// Two lanes merging into one at waypoint 2.
fn merge() -> Vec<WaypointRecord> {
    let mut records = vec![
        waypoint("left", [-3.0, 0.0, 0.0], &[2], &[]),
        waypoint("right", [3.0, 0.0, 0.0], &[2], &[]),
        waypoint("merge", [0.0, 0.0, 10.0], &[3], &[0, 1]),
        waypoint("after", [0.0, 0.0, 20.0], &[], &[2]),
    ];
    records[2].zipper_give_way = true;
    records
}

#[test]
fn test_zipper_give_way_marks_predecessors() -> Result<()> {
    let mut graph = WaypointGraph::from_records(&merge(), GraphLoadPolicy::Strict)?;

    assert!(graph.is_give_way(WaypointId(0)));
    assert!(graph.is_give_way(WaypointId(1)));
    assert!(!graph.is_give_way(WaypointId(2)));
    assert!(!graph.is_give_way(WaypointId(3)));

    // Already applied at load
    assert!(graph.apply_zipper_give_way().is_empty());
    Ok(())
}

#[test]
fn test_zipper_pass_is_idempotent_on_random_graphs() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5EED);

    for _ in 0..50 {
        let count = rng.gen_range(2..30);
        let mut records: Vec<WaypointRecord> = (0..count)
            .map(|i| waypoint(&format!("wp-{i}"), [i as f32, 0.0, 0.0], &[], &[]))
            .collect();

        // Forward edges only, so the graph is acyclic and symmetric by construction.
        for from in 0..count {
            for to in from + 1..count {
                if rng.gen_bool(0.15) {
                    records[from].neighbors.push(to);
                    records[to].prev.push(from);
                }
            }
            records[from].zipper_give_way = rng.gen_bool(0.3);
            records[from].give_way = rng.gen_bool(0.1);
        }

        let mut graph = WaypointGraph::from_records(&records, GraphLoadPolicy::Strict)?;
        let once: Vec<bool> = graph.ids().map(|id| graph.is_give_way(id)).collect();

        assert!(graph.apply_zipper_give_way().is_empty());
        let twice: Vec<bool> = graph.ids().map(|id| graph.is_give_way(id)).collect();
        assert_eq!(once, twice);

        for id in graph.ids() {
            if graph.is_zipper_give_way(id) {
                for &prev in graph.prev(id) {
                    assert!(graph.is_give_way(prev));
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_out_of_range_access_returns_defaults() -> Result<()> {
    let mut graph = WaypointGraph::from_records(&lane(3, 10.0), GraphLoadPolicy::Strict)?;
    let bad = WaypointId(99);

    assert_eq!(graph.position(bad), Point::origin());
    assert_eq!(graph.name(bad), "");
    assert_eq!(graph.max_speed(bad), 0.0);
    assert!(graph.neighbors(bad).is_empty());
    assert!(graph.prev(bad).is_empty());
    assert!(graph.neighbors_filtered(bad, Some(VehicleType::Car)).is_empty());
    assert!(!graph.is_stop(bad));
    assert!(!graph.is_give_way(bad));
    assert!(!graph.allows(bad, VehicleType::Car));
    assert_eq!(graph.event_data(bad), None);
    assert!(!graph.set_stop(bad, true));

    // The rest of the graph is untouched
    assert_eq!(graph.neighbors(WaypointId(0)), &[WaypointId(1)]);
    Ok(())
}

#[test]
fn test_filtered_neighbors_skip_disabled_and_restricted() -> Result<()> {
    let mut records = vec![
        waypoint("fork", [0.0, 0.0, 0.0], &[1, 2], &[]),
        waypoint("closed", [-3.0, 0.0, 10.0], &[], &[0]),
        waypoint("bus lane", [3.0, 0.0, 10.0], &[], &[0]),
    ];
    records[1].temporarily_disabled = true;
    records[2].allowed_vehicles = vec![VehicleType::Bus];

    let mut graph = WaypointGraph::from_records(&records, GraphLoadPolicy::Strict)?;
    let fork = WaypointId(0);

    assert_eq!(graph.neighbors(fork).len(), 2);
    assert_eq!(graph.neighbors_filtered(fork, None), vec![WaypointId(2)]);
    assert_eq!(graph.neighbors_filtered(fork, Some(VehicleType::Bus)), vec![WaypointId(2)]);
    assert!(graph.neighbors_filtered(fork, Some(VehicleType::Car)).is_empty());

    assert!(graph.set_temporarily_disabled(WaypointId(1), false));
    assert!(!graph.set_temporarily_disabled(WaypointId(1), false));
    assert_eq!(graph.neighbors_filtered(fork, Some(VehicleType::Car)), vec![WaypointId(1)]);
    Ok(())
}

#[test]
fn test_flag_setters_report_changes() -> Result<()> {
    let mut graph = WaypointGraph::from_records(&lane(2, 10.0), GraphLoadPolicy::Strict)?;
    let id = WaypointId(1);

    assert!(graph.set_stop(id, true));
    assert!(!graph.set_stop(id, true));
    assert!(graph.is_stop(id));
    assert!(graph.set_give_way(id, true));
    assert!(!graph.set_give_way(id, true));

    graph.set_trigger_event(id, true, Some("toll".to_string()));
    assert!(graph.is_trigger_event(id));
    assert_eq!(graph.event_data(id), Some("toll"));
    Ok(())
}

#[test]
fn test_records_round_trip() -> Result<()> {
    let config = SimulationConfig::load_from_files("scene.toml", "vehicles.toml")?;
    let graph = WaypointGraph::from_records(&config.scene.waypoints, GraphLoadPolicy::Strict)?;
    assert_eq!(graph.to_records(), config.scene.waypoints);

    let text = toml::to_string(&config.scene)?;
    let reparsed: SceneConfig = toml::from_str(&text)?;
    assert_eq!(reparsed, config.scene);
    Ok(())
}

#[test]
fn test_spatial_queries() -> Result<()> {
    let config = SimulationConfig::load_from_files("scene.toml", "vehicles.toml")?;
    let graph = WaypointGraph::from_records(&config.scene.waypoints, GraphLoadPolicy::Strict)?;

    // Stop and exit waypoints sit 8 m out and 2 m to the side of the centre
    let near_centre = graph.waypoints_within(&Point::origin(), 10.0);
    assert_eq!(near_centre.len(), 8);
    for id in near_centre {
        assert!((graph.position(id) - Point::origin()).norm() <= 10.0);
    }

    let first = graph.position(WaypointId(0));
    assert_eq!(graph.nearest(&(first + Vec3::new(0.5, 0.0, 0.5))), Some(WaypointId(0)));
    Ok(())
}
