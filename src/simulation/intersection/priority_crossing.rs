use super::{IntersectionContext, IntersectionController, LightColor, Occupancy, PedestrianSignal, Road};
use crate::simulation::{PedestrianId, VehicleId, WaypointId};

/// Zebra crossing: vehicles stop while any pedestrian is on it.
#[derive(Debug, Clone)]
pub struct PriorityCrossing {
    name: String,
    road: Road,
    signal: PedestrianSignal,
    pedestrians: Vec<PedestrianId>,
    stop: bool,
    /// Set by an external override; automatic updates are suspended.
    stop_updating: bool,
    occupancy: Occupancy,
    color: Option<LightColor>,
    inert: bool,
}

impl PriorityCrossing {
    pub fn new(name: &str, road: Road, pedestrian_waypoints: Vec<WaypointId>) -> Self {
        let inert = road.waypoints.is_empty();
        if inert {
            log::warn!("Priority crossing '{}' has no stop waypoints; it stays inert", name);
        }
        Self {
            name: name.to_string(),
            road,
            signal: PedestrianSignal::new(pedestrian_waypoints),
            pedestrians: Vec::new(),
            stop: false,
            stop_updating: false,
            occupancy: Occupancy::default(),
            color: None,
            inert,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    pub fn pedestrians_crossing(&self) -> usize {
        self.pedestrians.len()
    }

    /// Force the vehicle state. With `stop_updating` set the state is kept
    /// regardless of pedestrians until the latch is released by another call.
    pub fn set_stop_state(&mut self, stop: bool, stop_updating: bool, ctx: &mut IntersectionContext) {
        self.stop = stop;
        self.stop_updating = stop_updating;
        self.apply(ctx);
    }

    fn refresh(&mut self, ctx: &mut IntersectionContext) {
        if self.inert {
            return;
        }
        if !self.stop_updating {
            self.stop = !self.pedestrians.is_empty();
        }
        self.apply(ctx);
    }

    fn apply(&mut self, ctx: &mut IntersectionContext) {
        ctx.set_road_stop(&self.road.waypoints, self.stop);
        let color = if self.stop { LightColor::Red } else { LightColor::Green };
        if self.color != Some(color) {
            ctx.lights.set_color(color, &self.road.lights);
            self.color = Some(color);
        }
        // Pedestrians may always step on unless vehicles were forced through.
        let can_cross = !(self.stop_updating && !self.stop);
        self.signal.request(can_cross, ctx.pedestrians);
    }
}

impl IntersectionController for PriorityCrossing {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop_waypoints(&self) -> Vec<WaypointId> {
        self.road.waypoints.clone()
    }

    fn exit_waypoints(&self) -> &[WaypointId] {
        &[]
    }

    fn pedestrian_waypoints(&self) -> &[WaypointId] {
        self.signal.waypoints()
    }

    fn init(&mut self, ctx: &mut IntersectionContext) {
        self.refresh(ctx);
    }

    fn is_path_free(&mut self, waypoint: WaypointId, _ctx: &mut IntersectionContext) -> bool {
        if self.inert {
            return false;
        }
        if !self.road.waypoints.contains(&waypoint) {
            log::warn!("'{}': waypoint {} is not a stop waypoint here", self.name, waypoint.0);
            return true;
        }
        !self.stop
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

    fn pedestrian_wants_to_cross(&mut self, pedestrian: PedestrianId, _road: usize, ctx: &mut IntersectionContext) {
        if !self.pedestrians.contains(&pedestrian) {
            self.pedestrians.push(pedestrian);
        }
        self.refresh(ctx);
    }

    fn pedestrian_passed(&mut self, pedestrian: PedestrianId, ctx: &mut IntersectionContext) {
        self.pedestrians.retain(|&p| p != pedestrian);
        self.refresh(ctx);
    }

    fn update(&mut self, _time: f32, ctx: &mut IntersectionContext) {
        self.signal.flush(ctx.pedestrians);
        self.refresh(ctx);
    }

    fn is_inert(&self) -> bool {
        self.inert
    }
}
