#![allow(dead_code)]

use waypoint_traffic::config::{CatalogEntry, DriveTunables, VehicleType, WaypointRecord};
use waypoint_traffic::simulation::{WaypointGraph, WaypointId};

pub const DT: f32 = 0.02;

pub fn waypoint(name: &str, position: [f32; 3], neighbors: &[usize], prev: &[usize]) -> WaypointRecord {
    WaypointRecord {
        name: name.to_string(),
        position,
        neighbors: neighbors.to_vec(),
        prev: prev.to_vec(),
        other_lanes: Vec::new(),
        max_speed: 13.89,
        lane_width: 4.0,
        give_way: false,
        complex_give_way: false,
        zipper_give_way: false,
        stop: false,
        trigger_event: false,
        temporarily_disabled: false,
        allowed_vehicles: Vec::new(),
        event_data: None,
        give_way_list: Vec::new(),
    }
}

/// Straight one-way lane along +z, `spacing` metres between waypoints.
pub fn lane(count: usize, spacing: f32) -> Vec<WaypointRecord> {
    (0..count)
        .map(|i| {
            let neighbors: Vec<usize> = if i + 1 < count { vec![i + 1] } else { Vec::new() };
            let prev: Vec<usize> = if i > 0 { vec![i - 1] } else { Vec::new() };
            waypoint(&format!("lane-{i}"), [0.0, 0.0, i as f32 * spacing], &neighbors, &prev)
        })
        .collect()
}

/// Unconnected waypoints, one per entry of `positions`.
pub fn isolated(positions: &[[f32; 3]]) -> WaypointGraph {
    let records: Vec<WaypointRecord> = positions
        .iter()
        .enumerate()
        .map(|(i, &p)| waypoint(&format!("wp-{i}"), p, &[], &[]))
        .collect();
    WaypointGraph::from_records(&records, Default::default()).expect("isolated waypoints form a valid graph")
}

pub fn ids(raw: &[usize]) -> Vec<WaypointId> {
    raw.iter().copied().map(WaypointId).collect()
}

pub fn entry(name: &str, vehicle_type: VehicleType, weight: u32) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        vehicle_type,
        weight,
        dont_instantiate: false,
        length: 4.5,
        width: 1.8,
        height: 1.5,
        mass: 1300.0,
        max_speed: 16.0,
        drive: DriveTunables::default(),
        wheels: Vec::new(),
        trailer: None,
    }
}
