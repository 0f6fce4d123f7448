//! Intersection controllers.
//!
//! Each controller owns a disjoint set of stop waypoints and gates entry by
//! toggling their stop flag through the graph and by answering
//! [`IntersectionController::is_path_free`]. Visual lights and the optional
//! pedestrian module are reached only through the injected
//! [`LightAppearance`] and [`PedestrianGate`] collaborators.

use rand::Rng;

use super::{EventBus, IntersectionId, PedestrianId, Point, TrafficEvent, VehicleId, WaypointGraph, WaypointId};
use crate::config::{IntersectionSettings, LightHandle, RoadRecord, SceneConfig};

pub mod lights;
pub mod lights_crossing;
pub mod priority;
pub mod priority_crossing;

pub use lights::*;
pub use lights_crossing::*;
pub use priority::*;
pub use priority_crossing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightColor {
    Green,
    /// Green road about to turn red.
    YellowGreen,
    Red,
    /// Red road about to turn green.
    YellowRed,
}

/// Receives color changes for the light objects of a road.
pub trait LightAppearance: Send {
    fn set_color(&mut self, color: LightColor, lights: &[LightHandle]);
}

pub struct NoLights;

impl LightAppearance for NoLights {
    fn set_color(&mut self, _color: LightColor, _lights: &[LightHandle]) {}
}

/// Interface of the optional pedestrian module.
pub trait PedestrianGate: Send {
    /// False while the module is still initializing.
    fn is_ready(&self) -> bool;
    fn set_crossing(&mut self, waypoints: &[WaypointId], can_cross: bool);
}

pub struct NoPedestrians;

impl PedestrianGate for NoPedestrians {
    fn is_ready(&self) -> bool {
        true
    }

    fn set_crossing(&mut self, _waypoints: &[WaypointId], _can_cross: bool) {}
}

/// Shared state a controller may touch while updating.
pub struct IntersectionContext<'a> {
    pub graph: &'a mut WaypointGraph,
    pub events: &'a mut EventBus,
    pub lights: &'a mut dyn LightAppearance,
    pub pedestrians: &'a mut dyn PedestrianGate,
}

impl<'a> IntersectionContext<'a> {
    pub fn set_stop(&mut self, waypoint: WaypointId, stop: bool) {
        if self.graph.set_stop(waypoint, stop) {
            self.events.publish(TrafficEvent::WaypointStopChanged { waypoint, stop });
        }
    }

    pub fn set_road_stop(&mut self, waypoints: &[WaypointId], stop: bool) {
        for &waypoint in waypoints {
            self.set_stop(waypoint, stop);
        }
    }
}

/// Stop waypoints of one incoming road.
#[derive(Debug, Clone, PartialEq)]
pub struct Road {
    pub waypoints: Vec<WaypointId>,
    pub green_time: f32,
    pub lights: Vec<LightHandle>,
}

impl Road {
    pub fn new(waypoints: Vec<WaypointId>, green_time: f32) -> Self {
        Self {
            waypoints,
            green_time,
            lights: Vec::new(),
        }
    }
}

impl From<&RoadRecord> for Road {
    fn from(record: &RoadRecord) -> Self {
        Self {
            waypoints: to_ids(&record.waypoints),
            green_time: record.green_time,
            lights: record.lights.clone(),
        }
    }
}

pub(crate) fn to_ids(indices: &[usize]) -> Vec<WaypointId> {
    indices.iter().copied().map(WaypointId).collect()
}

/// Walk/don't-walk state for a set of pedestrian waypoints. Updates that
/// arrive while the pedestrian module is not ready are kept and retried.
#[derive(Debug, Clone, Default)]
pub struct PedestrianSignal {
    waypoints: Vec<WaypointId>,
    pending: Option<bool>,
    delivered: Option<bool>,
}

impl PedestrianSignal {
    pub fn new(waypoints: Vec<WaypointId>) -> Self {
        Self {
            waypoints,
            pending: None,
            delivered: None,
        }
    }

    pub fn waypoints(&self) -> &[WaypointId] {
        &self.waypoints
    }

    pub fn request(&mut self, can_cross: bool, gate: &mut dyn PedestrianGate) {
        if self.waypoints.is_empty() {
            return;
        }
        if self.pending.is_none() && self.delivered == Some(can_cross) {
            return;
        }
        self.pending = Some(can_cross);
        self.flush(gate);
    }

    pub fn flush(&mut self, gate: &mut dyn PedestrianGate) {
        let Some(can_cross) = self.pending else {
            return;
        };
        if gate.is_ready() {
            gate.set_crossing(&self.waypoints, can_cross);
            self.delivered = Some(can_cross);
            self.pending = None;
        } else {
            log::debug!("Pedestrian module not ready; deferring crossing update");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn delivered(&self) -> Option<bool> {
        self.delivered
    }
}

/// Vehicles currently inside a controlled zone.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    vehicles: Vec<VehicleId>,
}

impl Occupancy {
    pub fn enter(&mut self, vehicle: VehicleId) {
        if !self.vehicles.contains(&vehicle) {
            self.vehicles.push(vehicle);
        }
    }

    pub fn leave(&mut self, vehicle: VehicleId) {
        self.vehicles.retain(|&v| v != vehicle);
    }

    pub fn count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

pub trait IntersectionController {
    fn name(&self) -> &str;

    fn stop_waypoints(&self) -> Vec<WaypointId>;

    fn exit_waypoints(&self) -> &[WaypointId];

    fn pedestrian_waypoints(&self) -> &[WaypointId];

    fn is_stop_waypoint(&self, waypoint: WaypointId) -> bool {
        self.stop_waypoints().contains(&waypoint)
    }

    /// Apply the initial state to the graph and lights.
    fn init(&mut self, ctx: &mut IntersectionContext);

    /// May change internal state as a side effect of asking.
    fn is_path_free(&mut self, waypoint: WaypointId, ctx: &mut IntersectionContext) -> bool;

    fn vehicle_enter(&mut self, vehicle: VehicleId);

    fn vehicle_left(&mut self, vehicle: VehicleId);

    fn occupancy(&self) -> usize;

    fn pedestrian_wants_to_cross(&mut self, pedestrian: PedestrianId, road: usize, ctx: &mut IntersectionContext);

    fn pedestrian_passed(&mut self, pedestrian: PedestrianId, ctx: &mut IntersectionContext);

    fn update(&mut self, time: f32, ctx: &mut IntersectionContext);

    fn is_inert(&self) -> bool;
}

pub enum Intersection {
    Priority(PriorityIntersection),
    TrafficLights(TrafficLightIntersection),
    PriorityCrossing(PriorityCrossing),
    LightCrossing(TrafficLightCrossing),
}

impl Intersection {
    pub fn controller(&self) -> &dyn IntersectionController {
        match self {
            Intersection::Priority(c) => c,
            Intersection::TrafficLights(c) => c,
            Intersection::PriorityCrossing(c) => c,
            Intersection::LightCrossing(c) => c,
        }
    }

    pub fn controller_mut(&mut self) -> &mut dyn IntersectionController {
        match self {
            Intersection::Priority(c) => c,
            Intersection::TrafficLights(c) => c,
            Intersection::PriorityCrossing(c) => c,
            Intersection::LightCrossing(c) => c,
        }
    }

    pub fn as_priority(&self) -> Option<&PriorityIntersection> {
        match self {
            Intersection::Priority(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_traffic_lights(&self) -> Option<&TrafficLightIntersection> {
        match self {
            Intersection::TrafficLights(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_priority_crossing(&self) -> Option<&PriorityCrossing> {
        match self {
            Intersection::PriorityCrossing(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_light_crossing(&self) -> Option<&TrafficLightCrossing> {
        match self {
            Intersection::LightCrossing(c) => Some(c),
            _ => None,
        }
    }

    /// Centroid of the gated waypoints, used for the active-set radius test.
    pub fn center(&self, graph: &WaypointGraph) -> Point {
        let controller = self.controller();
        let mut waypoints = controller.stop_waypoints();
        waypoints.extend_from_slice(controller.exit_waypoints());
        if waypoints.is_empty() {
            return Point::origin();
        }
        let sum = waypoints
            .iter()
            .fold(super::Vec3::zeros(), |acc, &id| acc + graph.position(id).coords);
        Point::from(sum / waypoints.len() as f32)
    }
}

impl From<PriorityIntersection> for Intersection {
    fn from(c: PriorityIntersection) -> Self {
        Intersection::Priority(c)
    }
}

impl From<TrafficLightIntersection> for Intersection {
    fn from(c: TrafficLightIntersection) -> Self {
        Intersection::TrafficLights(c)
    }
}

impl From<PriorityCrossing> for Intersection {
    fn from(c: PriorityCrossing) -> Self {
        Intersection::PriorityCrossing(c)
    }
}

impl From<TrafficLightCrossing> for Intersection {
    fn from(c: TrafficLightCrossing) -> Self {
        Intersection::LightCrossing(c)
    }
}

/// Owns every controller of the scene and routes queries by id.
pub struct IntersectionManager {
    intersections: Vec<Intersection>,
    active: Vec<IntersectionId>,
    lights: Box<dyn LightAppearance>,
    pedestrians: Box<dyn PedestrianGate>,
}

impl Default for IntersectionManager {
    fn default() -> Self {
        Self::new(Box::new(NoLights), Box::new(NoPedestrians))
    }
}

macro_rules! with_context {
    ($self:ident, $graph:ident, $events:ident, |$intersections:ident, $ctx:ident| $body:expr) => {{
        let IntersectionManager {
            intersections: ref mut $intersections,
            ref mut lights,
            ref mut pedestrians,
            ..
        } = *$self;
        let mut $ctx = IntersectionContext {
            graph: $graph,
            events: $events,
            lights: lights.as_mut(),
            pedestrians: pedestrians.as_mut(),
        };
        $body
    }};
}

impl IntersectionManager {
    pub fn new(lights: Box<dyn LightAppearance>, pedestrians: Box<dyn PedestrianGate>) -> Self {
        Self {
            intersections: Vec::new(),
            active: Vec::new(),
            lights,
            pedestrians,
        }
    }

    pub fn set_light_appearance(&mut self, lights: Box<dyn LightAppearance>) {
        self.lights = lights;
    }

    pub fn set_pedestrian_gate(&mut self, pedestrians: Box<dyn PedestrianGate>) {
        self.pedestrians = pedestrians;
    }

    /// Build every controller described by the scene. Traffic-light
    /// intersections start on a random road, light crossings get a random
    /// start offset.
    pub fn from_scene<R: Rng>(
        scene: &SceneConfig,
        settings: &IntersectionSettings,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
        rng: &mut R,
    ) -> Self {
        let mut manager = Self::default();

        for record in &scene.priority_intersections {
            let controller = PriorityIntersection::new(
                &record.name,
                record.roads.iter().map(Road::from).collect(),
                to_ids(&record.exit_waypoints),
                to_ids(&record.pedestrian_waypoints),
            );
            manager.add(controller, graph, events);
        }

        for record in &scene.traffic_light_intersections {
            let start_road = if record.roads.is_empty() {
                0
            } else {
                rng.gen_range(0..record.roads.len())
            };
            let controller = TrafficLightIntersection::new(
                &record.name,
                record.roads.iter().map(Road::from).collect(),
                to_ids(&record.exit_waypoints),
                record.yellow_time,
                record.pedestrian_phase.as_ref().map(Road::from),
                start_road,
            );
            manager.add(controller, graph, events);
        }

        for record in &scene.priority_crossings {
            let controller = PriorityCrossing::new(
                &record.name,
                Road::from(&record.road),
                to_ids(&record.pedestrian_waypoints),
            );
            manager.add(controller, graph, events);
        }

        for record in &scene.traffic_light_crossings {
            let jitter = if settings.crossing_jitter > 0.0 {
                rng.gen_range(0.0..settings.crossing_jitter)
            } else {
                0.0
            };
            let controller = TrafficLightCrossing::new(
                &record.name,
                Road::from(&record.road),
                CrossingTimings {
                    green: record.green_time,
                    yellow: record.yellow_time,
                    red: record.red_time,
                },
                to_ids(&record.pedestrian_waypoints),
                record.pedestrian_lights.clone(),
                jitter,
            );
            manager.add(controller, graph, events);
        }

        manager
    }

    /// Register a controller: wire its waypoints in the graph and apply its
    /// initial state. New controllers start active.
    pub fn add(
        &mut self,
        intersection: impl Into<Intersection>,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) -> IntersectionId {
        let id = IntersectionId(self.intersections.len());
        let mut intersection = intersection.into();

        {
            let controller = intersection.controller();
            let mut wired = controller.stop_waypoints();
            wired.extend_from_slice(controller.exit_waypoints());
            wired.extend_from_slice(controller.pedestrian_waypoints());
            for waypoint in wired {
                graph.add_intersection(waypoint, id);
            }
        }

        let mut ctx = IntersectionContext {
            graph,
            events,
            lights: self.lights.as_mut(),
            pedestrians: self.pedestrians.as_mut(),
        };
        intersection.controller_mut().init(&mut ctx);

        log::debug!("Intersection {} '{}' registered", id.0, intersection.controller().name());
        self.intersections.push(intersection);
        self.active.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    pub fn get(&self, id: IntersectionId) -> Option<&Intersection> {
        self.intersections.get(id.0)
    }

    pub fn get_mut(&mut self, id: IntersectionId) -> Option<&mut Intersection> {
        self.intersections.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IntersectionId, &Intersection)> {
        self.intersections
            .iter()
            .enumerate()
            .map(|(i, intersection)| (IntersectionId(i), intersection))
    }

    pub fn active(&self) -> &[IntersectionId] {
        &self.active
    }

    /// Advance the timers of every active controller.
    pub fn update(&mut self, time: f32, graph: &mut WaypointGraph, events: &mut EventBus) {
        let active = &self.active;
        // Only the controller list is borrowed mutably here.
        with_context!(self, graph, events, |intersections, ctx| {
            for id in active {
                if let Some(intersection) = intersections.get_mut(id.0) {
                    intersection.controller_mut().update(time, &mut ctx);
                }
            }
        })
    }

    /// Recompute which intersections are near enough to a viewpoint to be
    /// updated. Returns true and raises `ActiveIntersectionsChanged` when the
    /// set changed.
    pub fn update_active(
        &mut self,
        viewpoints: &[Point],
        radius: f32,
        graph: &WaypointGraph,
        events: &mut EventBus,
    ) -> bool {
        let radius_sq = radius * radius;
        let active: Vec<IntersectionId> = self
            .iter()
            .filter(|(_, intersection)| {
                let center = intersection.center(graph);
                viewpoints
                    .iter()
                    .any(|viewpoint| (viewpoint - center).norm_squared() <= radius_sq)
            })
            .map(|(id, _)| id)
            .collect();

        if active == self.active {
            return false;
        }
        log::debug!("Active intersections: {} of {}", active.len(), self.intersections.len());
        self.active = active.clone();
        events.publish(TrafficEvent::ActiveIntersectionsChanged { active });
        true
    }

    pub fn is_path_free(
        &mut self,
        id: IntersectionId,
        waypoint: WaypointId,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) -> bool {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(intersection) => intersection.controller_mut().is_path_free(waypoint, &mut ctx),
                None => {
                    log::error!("is_path_free: intersection {} out of range", id.0);
                    false
                }
            }
        })
    }

    pub fn vehicle_enter(&mut self, id: IntersectionId, vehicle: VehicleId) {
        match self.intersections.get_mut(id.0) {
            Some(intersection) => intersection.controller_mut().vehicle_enter(vehicle),
            None => log::error!("vehicle_enter: intersection {} out of range", id.0),
        }
    }

    pub fn vehicle_left(&mut self, id: IntersectionId, vehicle: VehicleId) {
        match self.intersections.get_mut(id.0) {
            Some(intersection) => intersection.controller_mut().vehicle_left(vehicle),
            None => log::error!("vehicle_left: intersection {} out of range", id.0),
        }
    }

    pub fn pedestrian_wants_to_cross(
        &mut self,
        id: IntersectionId,
        pedestrian: PedestrianId,
        road: usize,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(intersection) => intersection
                    .controller_mut()
                    .pedestrian_wants_to_cross(pedestrian, road, &mut ctx),
                None => log::error!("pedestrian_wants_to_cross: intersection {} out of range", id.0),
            }
        })
    }

    pub fn pedestrian_passed(
        &mut self,
        id: IntersectionId,
        pedestrian: PedestrianId,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(intersection) => intersection.controller_mut().pedestrian_passed(pedestrian, &mut ctx),
                None => log::error!("pedestrian_passed: intersection {} out of range", id.0),
            }
        })
    }

    /// Force `road` green on a traffic-light intersection, optionally
    /// freezing the rotation. Returns false if `id` is not one.
    pub fn set_green_road(
        &mut self,
        id: IntersectionId,
        road: usize,
        freeze: bool,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) -> bool {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(Intersection::TrafficLights(c)) => {
                    c.set_green_road(road, freeze, &mut ctx);
                    true
                }
                _ => {
                    log::warn!("set_green_road: intersection {} is not a traffic-light intersection", id.0);
                    false
                }
            }
        })
    }

    pub fn resume_rotation(&mut self, id: IntersectionId) -> bool {
        match self.intersections.get_mut(id.0) {
            Some(Intersection::TrafficLights(c)) => {
                c.resume_rotation();
                true
            }
            _ => {
                log::warn!("resume_rotation: intersection {} is not a traffic-light intersection", id.0);
                false
            }
        }
    }

    pub fn set_crossing_state(
        &mut self,
        id: IntersectionId,
        color: LightColor,
        freeze: bool,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) -> bool {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(Intersection::LightCrossing(c)) => {
                    c.set_crossing_state(color, freeze, &mut ctx);
                    true
                }
                _ => {
                    log::warn!("set_crossing_state: intersection {} is not a light crossing", id.0);
                    false
                }
            }
        })
    }

    pub fn set_stop_state(
        &mut self,
        id: IntersectionId,
        stop: bool,
        stop_updating: bool,
        graph: &mut WaypointGraph,
        events: &mut EventBus,
    ) -> bool {
        with_context!(self, graph, events, |intersections, ctx| {
            match intersections.get_mut(id.0) {
                Some(Intersection::PriorityCrossing(c)) => {
                    c.set_stop_state(stop, stop_updating, &mut ctx);
                    true
                }
                _ => {
                    log::warn!("set_stop_state: intersection {} is not a priority crossing", id.0);
                    false
                }
            }
        })
    }
}
