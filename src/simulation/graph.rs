//! Waypoint graph and its access layer.
//!
//! Waypoints are stored in a flat array and reference each other by index
//! only, which is also how they are persisted. Every accessor takes a
//! [`WaypointId`] and, when the index is out of range, logs an error and
//! returns a safe default so a single bad agent never aborts the tick.

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashSet;

use super::{IntersectionId, Point, WaypointId};
use crate::config::{VehicleType, WaypointRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub name: String,
    pub position: Point,
    pub neighbors: Vec<WaypointId>,
    pub prev: Vec<WaypointId>,
    pub other_lanes: Vec<WaypointId>,
    pub max_speed: f32,
    pub lane_width: f32,
    pub give_way: bool,
    pub complex_give_way: bool,
    pub zipper_give_way: bool,
    pub stop: bool,
    pub trigger_event: bool,
    pub temporarily_disabled: bool,
    pub allowed_vehicles: Vec<VehicleType>,
    pub event_data: Option<String>,
    pub give_way_list: Vec<WaypointId>,
    /// Controllers gating this waypoint; wired at intersection construction.
    pub intersections: Vec<IntersectionId>,
}

impl Waypoint {
    pub fn allows(&self, vehicle_type: VehicleType) -> bool {
        self.allowed_vehicles.is_empty() || self.allowed_vehicles.contains(&vehicle_type)
    }

    fn from_record(record: &WaypointRecord) -> Self {
        let ids = |list: &[usize]| list.iter().copied().map(WaypointId).collect::<Vec<_>>();
        Self {
            name: record.name.clone(),
            position: Point::new(record.position[0], record.position[1], record.position[2]),
            neighbors: ids(&record.neighbors),
            prev: ids(&record.prev),
            other_lanes: ids(&record.other_lanes),
            max_speed: record.max_speed,
            lane_width: record.lane_width,
            give_way: record.give_way,
            complex_give_way: record.complex_give_way,
            zipper_give_way: record.zipper_give_way,
            stop: record.stop,
            trigger_event: record.trigger_event,
            temporarily_disabled: record.temporarily_disabled,
            allowed_vehicles: record.allowed_vehicles.clone(),
            event_data: record.event_data.clone(),
            give_way_list: ids(&record.give_way_list),
            intersections: Vec::new(),
        }
    }

    fn to_record(&self) -> WaypointRecord {
        let raw = |list: &[WaypointId]| list.iter().map(|id| id.0).collect::<Vec<_>>();
        WaypointRecord {
            name: self.name.clone(),
            position: [self.position.x, self.position.y, self.position.z],
            neighbors: raw(&self.neighbors),
            prev: raw(&self.prev),
            other_lanes: raw(&self.other_lanes),
            max_speed: self.max_speed,
            lane_width: self.lane_width,
            give_way: self.give_way,
            complex_give_way: self.complex_give_way,
            zipper_give_way: self.zipper_give_way,
            stop: self.stop,
            trigger_event: self.trigger_event,
            temporarily_disabled: self.temporarily_disabled,
            allowed_vehicles: self.allowed_vehicles.clone(),
            event_data: self.event_data.clone(),
            give_way_list: raw(&self.give_way_list),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("waypoint graph is empty")]
    Empty,
    #[error("waypoint {from} lists {to} in `{list}` but the graph has only {len} waypoints")]
    DanglingIndex {
        from: usize,
        to: usize,
        list: &'static str,
        len: usize,
    },
    #[error("waypoint {from} has neighbor {to}, but {to} does not list {from} as prev")]
    MissingPrev { from: usize, to: usize },
    #[error("waypoint {from} has prev {to}, but {to} does not list {from} as neighbor")]
    MissingNeighbor { from: usize, to: usize },
}

/// How [`WaypointGraph::from_records`] treats inconsistent adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphLoadPolicy {
    /// Reject dangling indices and asymmetric neighbor/prev pairs.
    #[default]
    Strict,
    /// Keep asymmetric pairs as authored; dangling indices are dropped. Each
    /// violation is logged.
    Trust,
}

#[derive(Debug, Clone)]
struct WaypointEntry {
    point: [f32; 3],
    id: WaypointId,
}

impl RTreeObject for WaypointEntry {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for WaypointEntry {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        let dz = self.point[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

static NO_WAYPOINTS: [WaypointId; 0] = [];
static NO_INTERSECTIONS: [IntersectionId; 0] = [];

#[derive(Debug, Clone)]
pub struct WaypointGraph {
    waypoints: Vec<Waypoint>,
    spatial_idx: RTree<WaypointEntry>,
}

impl WaypointGraph {
    pub fn from_records(records: &[WaypointRecord], policy: GraphLoadPolicy) -> Result<Self, GraphError> {
        if records.is_empty() {
            return Err(GraphError::Empty);
        }

        let len = records.len();
        let mut waypoints: Vec<Waypoint> = records.iter().map(Waypoint::from_record).collect();

        for (from, waypoint) in waypoints.iter_mut().enumerate() {
            let lists: [(&'static str, &mut Vec<WaypointId>); 4] = [
                ("neighbors", &mut waypoint.neighbors),
                ("prev", &mut waypoint.prev),
                ("other_lanes", &mut waypoint.other_lanes),
                ("give_way_list", &mut waypoint.give_way_list),
            ];
            for (list, ids) in lists {
                if let Some(bad) = ids.iter().find(|id| id.0 >= len) {
                    let error = GraphError::DanglingIndex { from, to: bad.0, list, len };
                    match policy {
                        GraphLoadPolicy::Strict => return Err(error),
                        GraphLoadPolicy::Trust => {
                            log::warn!("{}; dropping it", error);
                            ids.retain(|id| id.0 < len);
                        }
                    }
                }
            }
        }

        let mut graph = Self::from_waypoints(waypoints);

        let violations = graph.check_symmetry();
        if let Some(first) = violations.first() {
            match policy {
                GraphLoadPolicy::Strict => return Err(first.clone()),
                GraphLoadPolicy::Trust => {
                    for violation in &violations {
                        log::warn!("Trusting asymmetric graph: {}", violation);
                    }
                }
            }
        }

        let changed = graph.apply_zipper_give_way();
        if !changed.is_empty() {
            log::debug!("Zipper give-way set on {} predecessor waypoints", changed.len());
        }

        Ok(graph)
    }

    fn from_waypoints(waypoints: Vec<Waypoint>) -> Self {
        let entries = waypoints
            .iter()
            .enumerate()
            .map(|(i, wp)| WaypointEntry {
                point: [wp.position.x, wp.position.y, wp.position.z],
                id: WaypointId(i),
            })
            .collect();
        Self {
            waypoints,
            spatial_idx: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = WaypointId> + '_ {
        (0..self.waypoints.len()).map(WaypointId)
    }

    pub fn get(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.get(id.0)
    }

    fn slot(&self, id: WaypointId, op: &str) -> Option<&Waypoint> {
        let waypoint = self.waypoints.get(id.0);
        if waypoint.is_none() {
            log::error!("{}: waypoint index {} out of range ({} waypoints)", op, id.0, self.waypoints.len());
        }
        waypoint
    }

    fn slot_mut(&mut self, id: WaypointId, op: &str) -> Option<&mut Waypoint> {
        let len = self.waypoints.len();
        let waypoint = self.waypoints.get_mut(id.0);
        if waypoint.is_none() {
            log::error!("{}: waypoint index {} out of range ({} waypoints)", op, id.0, len);
        }
        waypoint
    }

    pub fn position(&self, id: WaypointId) -> Point {
        self.slot(id, "position").map_or(Point::origin(), |wp| wp.position)
    }

    pub fn name(&self, id: WaypointId) -> &str {
        self.slot(id, "name").map_or("", |wp| wp.name.as_str())
    }

    pub fn max_speed(&self, id: WaypointId) -> f32 {
        self.slot(id, "max_speed").map_or(0.0, |wp| wp.max_speed)
    }

    pub fn lane_width(&self, id: WaypointId) -> f32 {
        self.slot(id, "lane_width").map_or(0.0, |wp| wp.lane_width)
    }

    pub fn neighbors(&self, id: WaypointId) -> &[WaypointId] {
        self.slot(id, "neighbors").map_or(&NO_WAYPOINTS, |wp| wp.neighbors.as_slice())
    }

    pub fn prev(&self, id: WaypointId) -> &[WaypointId] {
        self.slot(id, "prev").map_or(&NO_WAYPOINTS, |wp| wp.prev.as_slice())
    }

    pub fn other_lanes(&self, id: WaypointId) -> &[WaypointId] {
        self.slot(id, "other_lanes").map_or(&NO_WAYPOINTS, |wp| wp.other_lanes.as_slice())
    }

    /// Successors that are enabled and, when `vehicle_type` is given, open to it.
    pub fn neighbors_filtered(&self, id: WaypointId, vehicle_type: Option<VehicleType>) -> Vec<WaypointId> {
        self.filter_usable(self.neighbors(id), vehicle_type)
    }

    pub fn prev_filtered(&self, id: WaypointId, vehicle_type: Option<VehicleType>) -> Vec<WaypointId> {
        self.filter_usable(self.prev(id), vehicle_type)
    }

    pub fn other_lanes_filtered(&self, id: WaypointId, vehicle_type: Option<VehicleType>) -> Vec<WaypointId> {
        self.filter_usable(self.other_lanes(id), vehicle_type)
    }

    fn filter_usable(&self, ids: &[WaypointId], vehicle_type: Option<VehicleType>) -> Vec<WaypointId> {
        ids.iter()
            .copied()
            .filter(|&id| match self.waypoints.get(id.0) {
                Some(wp) => !wp.temporarily_disabled && vehicle_type.map_or(true, |t| wp.allows(t)),
                None => false,
            })
            .collect()
    }

    pub fn allows(&self, id: WaypointId, vehicle_type: VehicleType) -> bool {
        self.slot(id, "allows").map_or(false, |wp| wp.allows(vehicle_type))
    }

    pub fn is_stop(&self, id: WaypointId) -> bool {
        self.slot(id, "is_stop").map_or(false, |wp| wp.stop)
    }

    /// Returns true when the flag actually changed.
    pub fn set_stop(&mut self, id: WaypointId, stop: bool) -> bool {
        match self.slot_mut(id, "set_stop") {
            Some(wp) if wp.stop != stop => {
                wp.stop = stop;
                true
            }
            _ => false,
        }
    }

    pub fn is_give_way(&self, id: WaypointId) -> bool {
        self.slot(id, "is_give_way").map_or(false, |wp| wp.give_way)
    }

    pub fn set_give_way(&mut self, id: WaypointId, give_way: bool) -> bool {
        match self.slot_mut(id, "set_give_way") {
            Some(wp) if wp.give_way != give_way => {
                wp.give_way = give_way;
                true
            }
            _ => false,
        }
    }

    pub fn is_complex_give_way(&self, id: WaypointId) -> bool {
        self.slot(id, "is_complex_give_way").map_or(false, |wp| wp.complex_give_way)
    }

    pub fn give_way_list(&self, id: WaypointId) -> &[WaypointId] {
        self.slot(id, "give_way_list").map_or(&NO_WAYPOINTS, |wp| wp.give_way_list.as_slice())
    }

    pub fn is_zipper_give_way(&self, id: WaypointId) -> bool {
        self.slot(id, "is_zipper_give_way").map_or(false, |wp| wp.zipper_give_way)
    }

    pub fn is_trigger_event(&self, id: WaypointId) -> bool {
        self.slot(id, "is_trigger_event").map_or(false, |wp| wp.trigger_event)
    }

    pub fn event_data(&self, id: WaypointId) -> Option<&str> {
        self.slot(id, "event_data").and_then(|wp| wp.event_data.as_deref())
    }

    pub fn set_trigger_event(&mut self, id: WaypointId, trigger: bool, data: Option<String>) {
        if let Some(wp) = self.slot_mut(id, "set_trigger_event") {
            wp.trigger_event = trigger;
            wp.event_data = data;
        }
    }

    pub fn is_temporarily_disabled(&self, id: WaypointId) -> bool {
        self.slot(id, "is_temporarily_disabled").map_or(false, |wp| wp.temporarily_disabled)
    }

    pub fn set_temporarily_disabled(&mut self, id: WaypointId, disabled: bool) -> bool {
        match self.slot_mut(id, "set_temporarily_disabled") {
            Some(wp) if wp.temporarily_disabled != disabled => {
                wp.temporarily_disabled = disabled;
                true
            }
            _ => false,
        }
    }

    pub fn intersections(&self, id: WaypointId) -> &[IntersectionId] {
        self.slot(id, "intersections").map_or(&NO_INTERSECTIONS, |wp| wp.intersections.as_slice())
    }

    pub fn add_intersection(&mut self, id: WaypointId, intersection: IntersectionId) {
        if let Some(wp) = self.slot_mut(id, "add_intersection") {
            if !wp.intersections.contains(&intersection) {
                wp.intersections.push(intersection);
            }
        }
    }

    /// Flag every predecessor of a zipper waypoint as give-way. Returns the
    /// waypoints whose flag changed; a second run returns nothing.
    pub fn apply_zipper_give_way(&mut self) -> Vec<WaypointId> {
        let targets: Vec<WaypointId> = self
            .waypoints
            .iter()
            .filter(|wp| wp.zipper_give_way)
            .flat_map(|wp| wp.prev.iter().copied())
            .collect();

        let mut changed = Vec::new();
        for id in targets {
            if self.set_give_way(id, true) {
                changed.push(id);
            }
        }
        changed
    }

    /// All neighbor/prev disagreements, in waypoint order.
    pub fn check_symmetry(&self) -> Vec<GraphError> {
        let mut violations = Vec::new();
        let edges: HashSet<(usize, usize)> = self
            .waypoints
            .iter()
            .enumerate()
            .flat_map(|(from, wp)| wp.neighbors.iter().map(move |to| (from, to.0)))
            .collect();
        let back_edges: HashSet<(usize, usize)> = self
            .waypoints
            .iter()
            .enumerate()
            .flat_map(|(to, wp)| wp.prev.iter().map(move |from| (from.0, to)))
            .collect();

        for (from, wp) in self.waypoints.iter().enumerate() {
            for to in &wp.neighbors {
                if !back_edges.contains(&(from, to.0)) {
                    violations.push(GraphError::MissingPrev { from, to: to.0 });
                }
            }
            for prev in &wp.prev {
                if !edges.contains(&(prev.0, from)) {
                    violations.push(GraphError::MissingNeighbor { from, to: prev.0 });
                }
            }
        }
        violations
    }

    pub fn waypoints_within(&self, point: &Point, radius: f32) -> Vec<WaypointId> {
        self.spatial_idx
            .locate_within_distance([point.x, point.y, point.z], radius * radius)
            .map(|entry| entry.id)
            .collect()
    }

    pub fn nearest(&self, point: &Point) -> Option<WaypointId> {
        self.spatial_idx
            .nearest_neighbor(&[point.x, point.y, point.z])
            .map(|entry| entry.id)
    }

    /// Serialize back to the flat record array; indices are preserved.
    pub fn to_records(&self) -> Vec<WaypointRecord> {
        self.waypoints.iter().map(Waypoint::to_record).collect()
    }
}
