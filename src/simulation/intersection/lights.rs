use super::{IntersectionContext, IntersectionController, LightColor, Occupancy, PedestrianSignal, Road};
use crate::simulation::{PedestrianId, VehicleId, WaypointId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPhase {
    Green,
    Yellow,
}

/// Signalled intersection rotating green between its roads. An optional
/// pedestrian phase takes part in the rotation as one extra road.
#[derive(Debug, Clone)]
pub struct TrafficLightIntersection {
    name: String,
    roads: Vec<Road>,
    /// Index of the pedestrian phase in `roads`, always the last one.
    pedestrian_road: Option<usize>,
    exit_waypoints: Vec<WaypointId>,
    yellow_time: f32,
    signal: PedestrianSignal,
    current_road: usize,
    phase: LightPhase,
    phase_start: f32,
    current_time: f32,
    frozen: bool,
    occupancy: Occupancy,
    pedestrians: Vec<PedestrianId>,
    colors: Vec<Option<LightColor>>,
    inert: bool,
}

impl TrafficLightIntersection {
    pub fn new(
        name: &str,
        mut roads: Vec<Road>,
        exit_waypoints: Vec<WaypointId>,
        yellow_time: f32,
        pedestrian_phase: Option<Road>,
        start_road: usize,
    ) -> Self {
        let inert = roads.is_empty();
        if inert {
            log::warn!("Traffic-light intersection '{}' has no roads; it will never turn green", name);
        }

        let mut signal = PedestrianSignal::default();
        let mut pedestrian_road = None;
        if let (false, Some(phase)) = (inert, pedestrian_phase) {
            signal = PedestrianSignal::new(phase.waypoints.clone());
            pedestrian_road = Some(roads.len());
            // The phase gates pedestrians, not vehicle stop waypoints.
            roads.push(Road {
                waypoints: Vec::new(),
                ..phase
            });
        }

        let current_road = if roads.is_empty() { 0 } else { start_road % roads.len() };

        Self {
            name: name.to_string(),
            colors: vec![None; roads.len()],
            roads,
            pedestrian_road,
            exit_waypoints,
            yellow_time,
            signal,
            current_road,
            phase: LightPhase::Green,
            phase_start: 0.0,
            current_time: 0.0,
            frozen: false,
            occupancy: Occupancy::default(),
            pedestrians: Vec::new(),
            inert,
        }
    }

    pub fn current_road(&self) -> usize {
        self.current_road
    }

    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    /// Number of roads in the rotation, including the pedestrian phase.
    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn next_road(&self) -> usize {
        (self.current_road + 1) % self.roads.len()
    }

    /// Color currently shown to `road`.
    pub fn road_color(&self, road: usize) -> LightColor {
        if self.inert || road >= self.roads.len() {
            return LightColor::Red;
        }
        match self.phase {
            LightPhase::Green if road == self.current_road => LightColor::Green,
            LightPhase::Yellow if road == self.current_road => LightColor::YellowGreen,
            LightPhase::Yellow if road == self.next_road() => LightColor::YellowRed,
            _ => LightColor::Red,
        }
    }

    pub fn road_of(&self, waypoint: WaypointId) -> Option<usize> {
        self.roads.iter().position(|road| road.waypoints.contains(&waypoint))
    }

    /// Agents inside the zone hold the red; without exits nobody can be
    /// counted out, so occupancy is ignored then. Pedestrians still on the
    /// crossing hold the walk phase in its clearance.
    fn must_hold(&self) -> bool {
        let vehicles_inside = !self.exit_waypoints.is_empty() && !self.occupancy.is_empty();
        let still_walking = self.pedestrian_road == Some(self.current_road) && !self.pedestrians.is_empty();
        vehicles_inside || still_walking
    }

    pub fn pedestrians_crossing(&self) -> usize {
        self.pedestrians.len()
    }

    fn apply(&mut self, ctx: &mut IntersectionContext) {
        for i in 0..self.roads.len() {
            let color = self.road_color(i);
            if Some(i) == self.pedestrian_road {
                self.signal.request(color == LightColor::Green, ctx.pedestrians);
            } else {
                ctx.set_road_stop(&self.roads[i].waypoints, color != LightColor::Green);
            }
            if self.colors[i] != Some(color) {
                ctx.lights.set_color(color, &self.roads[i].lights);
                self.colors[i] = Some(color);
            }
        }
    }

    /// Make `road` green now. A frozen intersection keeps it until
    /// [`resume_rotation`](Self::resume_rotation).
    pub fn set_green_road(&mut self, road: usize, freeze: bool, ctx: &mut IntersectionContext) {
        if self.inert || road >= self.roads.len() {
            log::warn!("'{}': cannot force road {} green", self.name, road);
            return;
        }
        self.current_road = road;
        self.phase = LightPhase::Green;
        self.phase_start = self.current_time;
        self.frozen = freeze;
        self.apply(ctx);
    }

    pub fn resume_rotation(&mut self) {
        self.frozen = false;
        self.phase_start = self.current_time;
    }
}

impl IntersectionController for TrafficLightIntersection {
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
        self.apply(ctx);
    }

    fn is_path_free(&mut self, waypoint: WaypointId, _ctx: &mut IntersectionContext) -> bool {
        if self.inert {
            return false;
        }
        match self.road_of(waypoint) {
            Some(road) => self.road_color(road) == LightColor::Green,
            None => {
                log::warn!("'{}': waypoint {} is not a stop waypoint here", self.name, waypoint.0);
                true
            }
        }
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

        let elapsed = time - self.phase_start;
        let changed = match self.phase {
            LightPhase::Green if elapsed >= self.roads[self.current_road].green_time => {
                self.phase = LightPhase::Yellow;
                true
            }
            LightPhase::Yellow if elapsed >= self.yellow_time => {
                if self.must_hold() {
                    false
                } else {
                    self.current_road = self.next_road();
                    self.phase = LightPhase::Green;
                    true
                }
            }
            _ => false,
        };

        if changed {
            self.phase_start = time;
            log::debug!("'{}': road {} {:?}", self.name, self.current_road, self.phase);
            self.apply(ctx);
        }
    }

    fn is_inert(&self) -> bool {
        self.inert
    }
}
