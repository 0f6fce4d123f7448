mod common;

use std::collections::HashSet;

use anyhow::Result;
use waypoint_traffic::{
    compute::{ComputeBackend, SimulationBackend},
    config::{SimulationParams, VehicleType, VehiclesConfig},
    simulation::{
        Intersection, IntersectionController, IntersectionId, IntersectionManager, KinematicIntegrator,
        PriorityCrossing, Road, SimulationState, TrafficLightIntersection, VehicleId, VehiclePool, WaypointGraph,
        WaypointId,
    },
};

use common::{entry, ids, lane, waypoint, DT};

const CAR: VehicleId = VehicleId(0);

/// A ten-waypoint lane (0..10, 10 m apart). The light's first road stops at
/// 1 and is left at 4; its second road stops on the unconnected waypoint 10.
/// A pedestrian crossing stops at 2, inside the light's zone.
struct Lane {
    state: SimulationState,
    backend: ComputeBackend,
    lights: IntersectionId,
    crossing: IntersectionId,
}

fn vehicles_config() -> VehiclesConfig {
    VehiclesConfig {
        simulation: SimulationParams {
            tick: DT,
            max_active_vehicles: 4,
            pool_capacity: 1,
            spawn_interval: 1.0,
        },
        catalog: vec![entry("sedan", VehicleType::Car, 1)],
        spawning: Default::default(),
        intersections: Default::default(),
        random: Default::default(),
        performance: Default::default(),
    }
}

fn lane_with_nested_zones() -> Result<Lane> {
    let mut records = lane(10, 10.0);
    records.push(waypoint("side-road", [20.0, 0.0, 0.0], &[], &[]));
    let graph = WaypointGraph::from_records(&records, Default::default())?;

    let config = vehicles_config();
    let pool = VehiclePool::build(&config.catalog, 1);
    let mut state = SimulationState::new(graph, IntersectionManager::default(), pool, DT);

    let roads = vec![Road::new(ids(&[1]), 4.0), Road::new(ids(&[10]), 4.0)];
    let lights = state.intersections.add(
        TrafficLightIntersection::new("junction", roads, ids(&[4]), 1.0, None, 0),
        &mut state.graph,
        &mut state.events,
    );
    let crossing = state.intersections.add(
        PriorityCrossing::new("zebra", Road::new(ids(&[2]), 0.0), Vec::new()),
        &mut state.graph,
        &mut state.events,
    );

    let mut backend = ComputeBackend::new_cpu(&config, Some(11));
    assert!(backend.traffic_mut().spawn_vehicle_at(&mut state, CAR, WaypointId(0)));

    Ok(Lane {
        state,
        backend,
        lights,
        crossing,
    })
}

fn occupancy(state: &SimulationState, id: IntersectionId) -> usize {
    state
        .intersections
        .get(id)
        .map(Intersection::controller)
        .map_or(0, |c| c.occupancy())
}

fn current_road(state: &SimulationState, id: IntersectionId) -> Option<usize> {
    state
        .intersections
        .get(id)
        .and_then(Intersection::as_traffic_lights)
        .map(|l| l.current_road())
}

/// Ticks for `seconds`, returning every road the light showed.
fn run(lane: &mut Lane, seconds: f32) -> Result<HashSet<usize>> {
    let mut integrator = KinematicIntegrator;
    let mut roads = HashSet::new();
    for _ in 0..(seconds / DT) as usize {
        lane.backend.update(&mut lane.state)?;
        lane.state.integrate(&mut integrator);
        roads.extend(current_road(&lane.state, lane.lights));
    }
    Ok(roads)
}

#[test]
fn test_nested_zones_are_each_released() -> Result<()> {
    let mut lane = lane_with_nested_zones()?;
    let mut integrator = KinematicIntegrator;

    let mut most_zones = 0;
    for _ in 0..(20.0 / DT) as usize {
        lane.backend.update(&mut lane.state)?;
        lane.state.integrate(&mut integrator);
        let inside = lane.state.vehicle(CAR).map_or(0, |v| v.intersections.len());
        most_zones = most_zones.max(inside);
    }

    assert_eq!(most_zones, 2, "never inside the crossing and the junction at once");
    let vehicle = lane.state.vehicle(CAR).expect("vehicle exists");
    assert!(vehicle.state.position.z > 40.0, "stuck at z={}", vehicle.state.position.z);
    assert!(vehicle.intersections.is_empty());
    assert_eq!(occupancy(&lane.state, lane.lights), 0);
    assert_eq!(occupancy(&lane.state, lane.crossing), 0);

    // An empty junction keeps rotating.
    let roads = run(&mut lane, 12.0)?;
    assert!(roads.contains(&0) && roads.contains(&1), "roads shown: {roads:?}");
    Ok(())
}

#[test]
fn test_excluded_vehicle_frees_its_zone() -> Result<()> {
    let mut lane = lane_with_nested_zones()?;
    let mut integrator = KinematicIntegrator;

    for _ in 0..(3.0 / DT) as usize {
        lane.backend.update(&mut lane.state)?;
        lane.state.integrate(&mut integrator);
        if lane.state.vehicle(CAR).map_or(false, |v| !v.intersections.is_empty()) {
            break;
        }
    }
    let vehicle = lane.state.vehicle(CAR).expect("vehicle exists");
    assert!(vehicle.intersections.contains(&lane.lights));
    assert_eq!(occupancy(&lane.state, lane.lights), 1);

    assert!(lane.state.exclude_vehicle(CAR));
    assert_eq!(occupancy(&lane.state, lane.lights), 0);
    assert_eq!(occupancy(&lane.state, lane.crossing), 0);
    assert!(lane.state.vehicle(CAR).map_or(false, |v| v.excluded && v.intersections.is_empty()));

    let roads = run(&mut lane, 15.0)?;
    assert!(roads.contains(&1), "the junction never left road 0");

    assert!(lane.state.include_vehicle(CAR));
    assert_eq!(lane.state.pool.idle_ids(), &[CAR]);
    Ok(())
}
