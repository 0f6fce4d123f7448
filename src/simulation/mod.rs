use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub mod actions;
pub mod drive;
pub mod events;
pub mod graph;
pub mod integrator;
pub mod intersection;
pub mod pool;
pub mod positioning;
pub mod traffic;
pub mod validator;
pub mod wheels;

pub use actions::*;
pub use drive::*;
pub use events::*;
pub use graph::*;
pub use integrator::*;
pub use intersection::*;
pub use pool::*;
pub use positioning::*;
pub use traffic::*;
pub use validator::*;
pub use wheels::*;

use crate::config::SimulationConfig;

pub type Vec3 = Vector3<f32>;
pub type Point = Point3<f32>;

/// Index of a waypoint in the flat waypoint array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaypointId(pub usize);

/// Slot of a vehicle instance in the pool arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub usize);

/// Index of an intersection controller in the [`IntersectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntersectionId(pub usize);

/// Pedestrian agent index, owned by the external pedestrian module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PedestrianId(pub usize);

/// Handle of the physics body a vehicle instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u32);

pub const KMH_TO_MS: f32 = 1.0 / 3.6;

/// Project onto the ground plane (y is up).
pub fn flat(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Signed angle in degrees from `from` to `to` around the up axis.
/// Positive means `to` lies to the right of `from`.
pub fn signed_angle_deg(from: &Vec3, to: &Vec3) -> f32 {
    let from = flat(*from);
    let to = flat(*to);
    if from.norm_squared() < f32::EPSILON || to.norm_squared() < f32::EPSILON {
        return 0.0;
    }
    let cross_y = from.z * to.x - from.x * to.z;
    cross_y.atan2(from.dot(&to)).to_degrees()
}

/// Kinematic snapshot of a vehicle body, written back by the physics integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Point,
    pub forward: Vec3,
    pub velocity: Vec3,
    pub trailer_speed: f32,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            position: Point::origin(),
            forward: Vec3::z(),
            velocity: Vec3::zeros(),
            trailer_speed: 0.0,
        }
    }
}

impl BodyState {
    pub fn forward_speed(&self) -> f32 {
        self.velocity.dot(&self.forward)
    }
}

/// Something a vehicle's trigger volume has detected ahead of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub position: Point,
    /// Speed along the observing vehicle's forward axis, `None` for static objects.
    pub speed: Option<f32>,
    pub source: ObstacleSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleSource {
    Vehicle(VehicleId),
    Player,
    Pedestrian(PedestrianId),
    Other,
}

pub struct SimulationState {
    pub graph: WaypointGraph,
    pub intersections: IntersectionManager,
    pub pool: VehiclePool,
    pub viewpoints: Vec<Point>,
    /// Non-traffic colliders (player vehicles etc.) the spawn validator must avoid.
    pub obstacles: Vec<Footprint>,
    pub events: EventBus,
    pub time: f32,
    pub dt: f32,
    pub tick: u64,
}

impl SimulationState {
    pub fn new(graph: WaypointGraph, intersections: IntersectionManager, pool: VehiclePool, dt: f32) -> Self {
        Self {
            graph,
            intersections,
            pool,
            viewpoints: Vec::new(),
            obstacles: Vec::new(),
            events: EventBus::new(),
            time: 0.0,
            dt,
            tick: 0,
        }
    }

    /// Build the graph, intersections and pool described by `config`.
    pub fn from_config(config: &SimulationConfig, seed: Option<u64>) -> anyhow::Result<Self> {
        let policy = if config.scene.graph.validate_symmetry {
            GraphLoadPolicy::Strict
        } else {
            GraphLoadPolicy::Trust
        };
        let mut graph = WaypointGraph::from_records(&config.scene.waypoints, policy)?;
        let mut events = EventBus::new();

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let intersections = IntersectionManager::from_scene(
            &config.scene,
            &config.vehicles.intersections,
            &mut graph,
            &mut events,
            &mut rng,
        );
        let pool = VehiclePool::build(
            &config.vehicles.catalog,
            config.vehicles.simulation.pool_capacity as usize,
        );

        log::info!(
            "Scene '{}': {} waypoints, {} intersections, {} pooled vehicles",
            config.scene.scene.name,
            graph.len(),
            intersections.len(),
            pool.len()
        );

        let mut state = Self::new(graph, intersections, pool, config.vehicles.simulation.tick);
        state.events = events;
        Ok(state)
    }

    pub fn active_vehicles(&self) -> usize {
        self.pool.active_ids().len()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleInstance> {
        self.pool.vehicle(id)
    }

    pub fn set_viewpoints(&mut self, viewpoints: Vec<Point>) {
        self.viewpoints = viewpoints;
    }

    /// Take a vehicle out of the kernel's hands, e.g. for a player-driven
    /// car. Zones it occupies are released first so no controller keeps
    /// waiting on it.
    pub fn exclude_vehicle(&mut self, id: VehicleId) -> bool {
        self.release_intersections(id);
        self.pool.exclude_vehicle(id)
    }

    pub fn include_vehicle(&mut self, id: VehicleId) -> bool {
        self.pool.include_vehicle(id)
    }

    pub(crate) fn release_intersections(&mut self, id: VehicleId) {
        let Some(vehicle) = self.pool.vehicle_mut(id) else {
            return;
        };
        for intersection in std::mem::take(&mut vehicle.intersections) {
            self.intersections.vehicle_left(intersection, id);
        }
    }

    /// Add an externally decided action (reverse, avoidance, overtake, ...).
    pub fn add_drive_action(&mut self, id: VehicleId, action: DriveAction, side: RoadSide) {
        if let Some(vehicle) = self.pool.vehicle_mut(id) {
            vehicle.actions.add(action, side);
        } else {
            log::error!("add_drive_action: vehicle {} out of range", id.0);
        }
    }

    pub fn remove_drive_action(&mut self, id: VehicleId, action: DriveAction) {
        if let Some(vehicle) = self.pool.vehicle_mut(id) {
            vehicle.actions.remove(action);
        } else {
            log::error!("remove_drive_action: vehicle {} out of range", id.0);
        }
    }

    /// Called by the host when something enters a vehicle's trigger volume.
    pub fn report_obstacle(&mut self, id: VehicleId, obstacle: Obstacle) {
        let Some(vehicle) = self.pool.vehicle_mut(id) else {
            log::error!("report_obstacle: vehicle {} out of range", id.0);
            return;
        };
        let entered = vehicle.obstacle.is_none();
        vehicle.obstacle = Some(obstacle);
        if entered {
            self.events.publish(TrafficEvent::ObjectEnteredTrigger {
                vehicle: id,
                source: obstacle.source,
            });
        }
    }

    pub fn clear_obstacle(&mut self, id: VehicleId) {
        let Some(vehicle) = self.pool.vehicle_mut(id) else {
            log::error!("clear_obstacle: vehicle {} out of range", id.0);
            return;
        };
        if let Some(obstacle) = vehicle.obstacle.take() {
            self.events.publish(TrafficEvent::ObjectLeftTrigger {
                vehicle: id,
                source: obstacle.source,
            });
        }
    }

    pub fn is_in_front(&self, a: VehicleId, b: VehicleId) -> bool {
        VehiclePositioningSystem::default().is_in_front_of(&self.graph, &self.pool, a, b)
    }

    /// Hand this tick's outputs to a physics integrator.
    pub fn integrate<P: PhysicsIntegrator>(&mut self, integrator: &mut P) {
        let dt = self.dt;
        let active: Vec<VehicleId> = self.pool.active_ids().to_vec();
        for id in active {
            if let Some(vehicle) = self.pool.vehicle_mut(id) {
                integrator.integrate(vehicle, dt);
            }
        }
    }
}

/// One tick's cost and load.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSample {
    pub frame_time: Duration,
    /// Time spent in the backend (bookkeeping plus both batches).
    pub batch_time: Duration,
    pub active_vehicles: usize,
    /// Drive plus wheel inputs handed to the batches this tick.
    pub batch_size: usize,
}

/// Rolling window of [`TickSample`]s for the console report.
#[derive(Debug)]
pub struct PerformanceTracker {
    samples: VecDeque<TickSample>,
    max_samples: usize,
    current_frame_start: Option<Instant>,
    current_batch_start: Option<Instant>,
    last_batch_time: Duration,
    peak_active: usize,
}

impl PerformanceTracker {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            current_frame_start: None,
            current_batch_start: None,
            last_batch_time: Duration::ZERO,
            peak_active: 0,
        }
    }

    pub fn start_frame(&mut self) {
        self.current_frame_start = Some(Instant::now());
    }

    pub fn start_batch(&mut self) {
        self.current_batch_start = Some(Instant::now());
    }

    pub fn end_batch(&mut self) {
        if let Some(start) = self.current_batch_start.take() {
            self.last_batch_time = start.elapsed();
        }
    }

    /// Close the frame and record the load it ran with. Each active vehicle
    /// feeds one drive input and one wheel input per wheel.
    pub fn end_frame(&mut self, state: &SimulationState) {
        let Some(start) = self.current_frame_start.take() else {
            return;
        };
        let active_vehicles = state.active_vehicles();
        let wheels: usize = state
            .pool
            .active_ids()
            .iter()
            .filter_map(|&id| state.vehicle(id))
            .map(|v| v.wheels.len())
            .sum();
        let batch_size = active_vehicles + wheels;
        self.record(TickSample {
            frame_time: start.elapsed(),
            batch_time: self.last_batch_time,
            active_vehicles,
            batch_size,
        });
    }

    pub fn record(&mut self, sample: TickSample) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.peak_active = self.peak_active.max(sample.active_vehicles);
        self.samples.push_back(sample);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn average_frame_time(&self) -> Duration {
        self.average(|s| s.frame_time)
    }

    pub fn average_batch_time(&self) -> Duration {
        self.average(|s| s.batch_time)
    }

    pub fn average_active_vehicles(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: usize = self.samples.iter().map(|s| s.active_vehicles).sum();
        total as f32 / self.samples.len() as f32
    }

    pub fn average_batch_size(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: usize = self.samples.iter().map(|s| s.batch_size).sum();
        total as f32 / self.samples.len() as f32
    }

    /// Highest active count since the tracker was created, not just in the window.
    pub fn peak_active_vehicles(&self) -> usize {
        self.peak_active
    }

    /// Batch inputs processed per second of backend time.
    pub fn batch_inputs_per_second(&self) -> f32 {
        let batch_secs: f32 = self.samples.iter().map(|s| s.batch_time.as_secs_f32()).sum();
        if batch_secs <= 0.0 {
            return 0.0;
        }
        let updates: usize = self.samples.iter().map(|s| s.batch_size).sum();
        updates as f32 / batch_secs
    }

    pub fn ticks_per_second(&self) -> f32 {
        let avg_frame_time = self.average_frame_time();
        if avg_frame_time.is_zero() {
            return 0.0;
        }
        1.0 / avg_frame_time.as_secs_f32()
    }

    fn average(&self, field: impl Fn(&TickSample) -> Duration) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().map(field).sum();
        total / self.samples.len() as u32
    }
}
