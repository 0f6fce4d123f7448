use super::{IntersectionContext, IntersectionController, LightColor, Occupancy, PedestrianSignal, Road};
use crate::simulation::{PedestrianId, VehicleId, WaypointId};

/// Seconds a requesting road waits before priority is taken from a busy road.
pub const PRIORITY_SWITCH_TIMEOUT: f32 = 3.0;
/// Vehicles allowed inside while the priority road keeps entering.
pub const MAX_PRIORITY_OCCUPANCY: usize = 3;

/// Unsignalled intersection where one road at a time holds priority.
#[derive(Debug, Clone)]
pub struct PriorityIntersection {
    name: String,
    roads: Vec<Road>,
    exit_waypoints: Vec<WaypointId>,
    signal: PedestrianSignal,
    priority_road: usize,
    requested_road: Option<usize>,
    request_time: f32,
    current_time: f32,
    occupancy: Occupancy,
    pedestrians: Vec<(PedestrianId, usize)>,
    colors: Vec<Option<LightColor>>,
    inert: bool,
}

impl PriorityIntersection {
    pub fn new(
        name: &str,
        roads: Vec<Road>,
        exit_waypoints: Vec<WaypointId>,
        pedestrian_waypoints: Vec<WaypointId>,
    ) -> Self {
        let inert = roads.is_empty();
        if inert {
            log::warn!("Priority intersection '{}' has no roads; it will never grant priority", name);
        }
        Self {
            name: name.to_string(),
            colors: vec![None; roads.len()],
            roads,
            exit_waypoints,
            signal: PedestrianSignal::new(pedestrian_waypoints),
            priority_road: 0,
            requested_road: None,
            request_time: 0.0,
            current_time: 0.0,
            occupancy: Occupancy::default(),
            pedestrians: Vec::new(),
            inert,
        }
    }

    pub fn priority_road(&self) -> usize {
        self.priority_road
    }

    pub fn requested_road(&self) -> Option<usize> {
        self.requested_road
    }

    pub fn road_of(&self, waypoint: WaypointId) -> Option<usize> {
        self.roads.iter().position(|road| road.waypoints.contains(&waypoint))
    }

    fn has_pedestrians(&self, road: usize) -> bool {
        self.pedestrians.iter().any(|&(_, r)| r == road)
    }

    fn try_switch(&mut self, ctx: &mut IntersectionContext) {
        let Some(requested) = self.requested_road else {
            return;
        };
        let waited = self.current_time - self.request_time;
        if self.occupancy.is_empty() || waited >= PRIORITY_SWITCH_TIMEOUT {
            log::debug!(
                "'{}': priority {} -> {} (occupancy {}, waited {:.2}s)",
                self.name,
                self.priority_road,
                requested,
                self.occupancy.count(),
                waited
            );
            self.priority_road = requested;
            self.requested_road = None;
            self.refresh(ctx);
        }
    }

    fn refresh(&mut self, ctx: &mut IntersectionContext) {
        for i in 0..self.roads.len() {
            let stop = i != self.priority_road || self.has_pedestrians(i);
            let road = &self.roads[i];
            ctx.set_road_stop(&road.waypoints, stop);

            let color = if stop { LightColor::Red } else { LightColor::Green };
            if self.colors[i] != Some(color) {
                ctx.lights.set_color(color, &road.lights);
                self.colors[i] = Some(color);
            }
        }
    }
}

impl IntersectionController for PriorityIntersection {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_waypoints(&self) -> Vec<WaypointId> {
        self.roads.iter().flat_map(|road| road.waypoints.iter().copied()).collect()
    }

    fn exit_waypoints(&self) -> &[WaypointId] {
        &self.exit_waypoints
    }

    fn pedestrian_waypoints(&self) -> &[WaypointId] {
        self.signal.waypoints()
    }

    fn init(&mut self, ctx: &mut IntersectionContext) {
        if self.inert {
            return;
        }
        self.refresh(ctx);
        // Pedestrians always have priority here.
        self.signal.request(true, ctx.pedestrians);
    }

    fn is_path_free(&mut self, waypoint: WaypointId, ctx: &mut IntersectionContext) -> bool {
        if self.inert {
            return false;
        }
        let Some(road) = self.road_of(waypoint) else {
            log::warn!("'{}': waypoint {} is not a stop waypoint here", self.name, waypoint.0);
            return true;
        };
        if self.has_pedestrians(road) {
            return false;
        }

        if road != self.priority_road {
            // Only the most recent requester is remembered; the wait is
            // measured from the first request.
            if self.requested_road.is_none() {
                self.request_time = self.current_time;
            }
            self.requested_road = Some(road);
            self.try_switch(ctx);
        }

        road == self.priority_road && self.occupancy.count() <= MAX_PRIORITY_OCCUPANCY
    }

    fn vehicle_enter(&mut self, vehicle: VehicleId) {
        self.occupancy.enter(vehicle);
    }

    fn vehicle_left(&mut self, vehicle: VehicleId) {
        self.occupancy.leave(vehicle);
    }

    fn occupancy(&self) -> usize {
        self.occupancy.count()
    }

    fn pedestrian_wants_to_cross(&mut self, pedestrian: PedestrianId, road: usize, ctx: &mut IntersectionContext) {
        if road >= self.roads.len() {
            log::error!("'{}': pedestrian road {} out of range", self.name, road);
            return;
        }
        if !self.pedestrians.iter().any(|&(p, _)| p == pedestrian) {
            self.pedestrians.push((pedestrian, road));
        }
        self.refresh(ctx);
    }

    fn pedestrian_passed(&mut self, pedestrian: PedestrianId, ctx: &mut IntersectionContext) {
        self.pedestrians.retain(|&(p, _)| p != pedestrian);
        if !self.inert {
            self.refresh(ctx);
        }
    }

    fn update(&mut self, time: f32, ctx: &mut IntersectionContext) {
        self.current_time = time;
        if self.inert {
            return;
        }
        self.signal.flush(ctx.pedestrians);
        self.try_switch(ctx);
        self.refresh(ctx);
    }

    fn is_inert(&self) -> bool {
        self.inert
    }
}
