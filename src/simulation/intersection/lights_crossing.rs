use super::{IntersectionContext, IntersectionController, LightColor, Occupancy, PedestrianSignal, Road};
use crate::config::LightHandle;
use crate::simulation::{PedestrianId, VehicleId, WaypointId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingTimings {
    pub green: f32,
    pub yellow: f32,
    pub red: f32,
}

/// Signalled pedestrian crossing on a single road. The walk signal runs in
/// antiphase: pedestrians cross while vehicles see red.
#[derive(Debug, Clone)]
pub struct TrafficLightCrossing {
    name: String,
    road: Road,
    timings: CrossingTimings,
    signal: PedestrianSignal,
    pedestrian_lights: Vec<LightHandle>,
    color: LightColor,
    phase_start: f32,
    current_time: f32,
    frozen: bool,
    occupancy: Occupancy,
    pedestrians: Vec<PedestrianId>,
    inert: bool,
}

impl TrafficLightCrossing {
    /// `start_offset` delays the first phase change.
    pub fn new(
        name: &str,
        road: Road,
        timings: CrossingTimings,
        pedestrian_waypoints: Vec<WaypointId>,
        pedestrian_lights: Vec<LightHandle>,
        start_offset: f32,
    ) -> Self {
        let inert = road.waypoints.is_empty();
        if inert {
            log::warn!("Traffic-light crossing '{}' has no stop waypoints; it stays inert", name);
        }
        Self {
            name: name.to_string(),
            road,
            timings,
            signal: PedestrianSignal::new(pedestrian_waypoints),
            pedestrian_lights,
            color: LightColor::Green,
            phase_start: start_offset,
            current_time: 0.0,
            frozen: false,
            occupancy: Occupancy::default(),
            pedestrians: Vec::new(),
            inert,
        }
    }

    pub fn color(&self) -> LightColor {
        self.color
    }

    pub fn pedestrians_crossing(&self) -> usize {
        self.pedestrians.len()
    }

    pub fn timings(&self) -> CrossingTimings {
        self.timings
    }

    fn duration(&self, color: LightColor) -> f32 {
        match color {
            LightColor::Green => self.timings.green,
            LightColor::YellowGreen | LightColor::YellowRed => self.timings.yellow,
            LightColor::Red => self.timings.red,
        }
    }

    fn next(color: LightColor) -> LightColor {
        match color {
            LightColor::Green => LightColor::YellowGreen,
            LightColor::YellowGreen => LightColor::Red,
            LightColor::Red => LightColor::YellowRed,
            LightColor::YellowRed => LightColor::Green,
        }
    }

    fn apply(&mut self, ctx: &mut IntersectionContext) {
        ctx.set_road_stop(&self.road.waypoints, self.color != LightColor::Green);
        ctx.lights.set_color(self.color, &self.road.lights);

        let walk = self.color == LightColor::Red;
        let pedestrian_color = if walk { LightColor::Green } else { LightColor::Red };
        ctx.lights.set_color(pedestrian_color, &self.pedestrian_lights);
        self.signal.request(walk, ctx.pedestrians);
    }

    pub fn set_crossing_state(&mut self, color: LightColor, freeze: bool, ctx: &mut IntersectionContext) {
        if self.inert {
            log::warn!("'{}': cannot override an inert crossing", self.name);
            return;
        }
        self.color = color;
        self.phase_start = self.current_time;
        self.frozen = freeze;
        self.apply(ctx);
    }
}

impl IntersectionController for TrafficLightCrossing {
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
        if self.inert {
            return;
        }
        self.apply(ctx);
    }

    fn is_path_free(&mut self, waypoint: WaypointId, _ctx: &mut IntersectionContext) -> bool {
        if self.inert {
            return false;
        }
        if !self.road.waypoints.contains(&waypoint) {
            log::warn!("'{}': waypoint {} is not a stop waypoint here", self.name, waypoint.0);
            return true;
        }
        self.color == LightColor::Green
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

    fn pedestrian_wants_to_cross(&mut self, pedestrian: PedestrianId, _road: usize, _ctx: &mut IntersectionContext) {
        if !self.pedestrians.contains(&pedestrian) {
            self.pedestrians.push(pedestrian);
        }
    }

    fn pedestrian_passed(&mut self, pedestrian: PedestrianId, _ctx: &mut IntersectionContext) {
        self.pedestrians.retain(|&p| p != pedestrian);
    }

    fn update(&mut self, time: f32, ctx: &mut IntersectionContext) {
        self.current_time = time;
        if self.inert {
            return;
        }
        self.signal.flush(ctx.pedestrians);
        if self.frozen {
            return;
        }

        let mut changed = false;
        // Bounded so zero-length phases cannot spin.
        for _ in 0..4 {
            let duration = self.duration(self.color);
            if time - self.phase_start < duration {
                break;
            }
            if self.color == LightColor::Red && !self.pedestrians.is_empty() {
                // Walk stays on until the crossing is clear.
                self.phase_start = time - duration;
                break;
            }
            self.phase_start += duration;
            self.color = Self::next(self.color);
            changed = true;
        }

        if changed {
            log::debug!("'{}': {:?}", self.name, self.color);
            self.apply(ctx);
        }
    }

    fn is_inert(&self) -> bool {
        self.inert
    }
}
