//! Arena of pre-built vehicle instances cycling between idle and active.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{
    ActiveActions, BodyHandle, BodyState, DriveAction, DriveOutput, Footprint, Gear, IntersectionId, Obstacle,
    RoadSide, Vec3, VehicleId, WaypointId, WheelOutput,
};
use crate::config::{CatalogEntry, DriveTunables, TrailerConfig, VehicleType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wheel {
    /// Mount point in body space.
    pub position: Vec3,
    pub radius: f32,
    pub travel: f32,
    pub steers: bool,
    pub compression: f32,
    pub previous_compression: f32,
    pub lateral_velocity: f32,
    pub spin: f32,
    pub output: WheelOutput,
}

impl Wheel {
    fn reset(&mut self) {
        self.compression = self.travel * 0.5;
        self.previous_compression = self.compression;
        self.lateral_velocity = 0.0;
        self.spin = 0.0;
        self.output = WheelOutput::default();
    }
}

#[derive(Debug, Clone)]
pub struct VehicleInstance {
    pub id: VehicleId,
    pub catalog_index: usize,
    pub name: String,
    pub vehicle_type: VehicleType,
    pub body: BodyHandle,
    pub length: f32,
    pub width: f32,
    pub height: f32,
    pub mass: f32,
    pub max_speed: f32,
    pub tunables: DriveTunables,
    pub wheels: Vec<Wheel>,
    pub trailer: Option<TrailerConfig>,
    /// Driven from outside; never spawned or despawned by the pool.
    pub excluded: bool,
    pub state: BodyState,
    pub actions: ActiveActions,
    pub action: DriveAction,
    pub side: RoadSide,
    pub target: Option<WaypointId>,
    pub previous_target: Option<WaypointId>,
    /// Intersection zones the vehicle is inside. Zones nest, so a vehicle
    /// can be in a crossing and a light-controlled junction at once.
    pub intersections: Vec<IntersectionId>,
    pub obstacle: Option<Obstacle>,
    pub giving_way: bool,
    pub steer_angle: f32,
    pub gear: Gear,
    pub output: DriveOutput,
}

impl VehicleInstance {
    fn from_catalog(id: VehicleId, catalog_index: usize, entry: &CatalogEntry) -> Self {
        let mut wheels: Vec<Wheel> = entry
            .wheels
            .iter()
            .map(|w| Wheel {
                position: Vec3::new(w.position[0], w.position[1], w.position[2]),
                radius: w.radius,
                travel: w.suspension_travel,
                steers: w.steer,
                compression: 0.0,
                previous_compression: 0.0,
                lateral_velocity: 0.0,
                spin: 0.0,
                output: WheelOutput::default(),
            })
            .collect();
        wheels.iter_mut().for_each(Wheel::reset);

        Self {
            id,
            catalog_index,
            name: entry.name.clone(),
            vehicle_type: entry.vehicle_type,
            body: BodyHandle(id.0 as u32),
            length: entry.length,
            width: entry.width,
            height: entry.height,
            mass: entry.mass,
            max_speed: entry.max_speed,
            tunables: entry.drive,
            wheels,
            trailer: entry.trailer,
            excluded: false,
            state: BodyState::default(),
            actions: ActiveActions::new(),
            action: DriveAction::Forward,
            side: RoadSide::Any,
            target: None,
            previous_target: None,
            intersections: Vec::new(),
            obstacle: None,
            giving_way: false,
            steer_angle: 0.0,
            gear: Gear::Drive,
            output: DriveOutput::default(),
        }
    }

    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.state.position, self.state.forward, self.length, self.width)
    }

    pub fn trailer_footprint(&self) -> Option<Footprint> {
        self.trailer.map(|trailer| {
            let back = self.length * 0.5 + trailer.hitch_offset + trailer.length * 0.5;
            let forward = self.state.forward.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
            Footprint::new(self.state.position - forward * back, forward, trailer.length, trailer.width)
        })
    }

    /// Axle spacing from the wheel layout, or a typical ratio of the length.
    pub fn wheelbase(&self) -> f32 {
        let (min, max) = self
            .wheels
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), w| (lo.min(w.position.z), hi.max(w.position.z)));
        if self.wheels.len() >= 2 && max - min > f32::EPSILON {
            max - min
        } else {
            self.length * 0.6
        }
    }

    pub fn total_mass(&self) -> f32 {
        self.mass + self.trailer.map_or(0.0, |t| t.mass)
    }

    /// Park the instance and forget all per-trip state.
    fn reset(&mut self) {
        self.state = BodyState::default();
        self.actions.clear();
        self.action = DriveAction::Forward;
        self.side = RoadSide::Any;
        self.target = None;
        self.previous_target = None;
        self.intersections.clear();
        self.obstacle = None;
        self.giving_way = false;
        self.steer_angle = 0.0;
        self.gear = Gear::Drive;
        self.output = DriveOutput::default();
        self.wheels.iter_mut().for_each(Wheel::reset);
    }
}

#[derive(Debug, Clone, Default)]
pub struct VehiclePool {
    vehicles: Vec<VehicleInstance>,
    idle: Vec<VehicleId>,
    active: Vec<VehicleId>,
}

impl VehiclePool {
    /// Instantiate at least one of every catalog entry, then split the rest
    /// of `capacity` by weight. Leftovers go to the largest remainders.
    pub fn build(catalog: &[CatalogEntry], capacity: usize) -> Self {
        let entries: Vec<usize> = catalog
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.dont_instantiate)
            .map(|(i, _)| i)
            .collect();

        if entries.is_empty() {
            log::warn!("Vehicle catalog has no instantiable entries; the pool is empty");
            return Self::default();
        }

        let mut counts = vec![1usize; entries.len()];
        if capacity < entries.len() {
            log::warn!(
                "Pool capacity {} is below the {} catalog entries; instantiating one of each",
                capacity,
                entries.len()
            );
        } else {
            let remaining = capacity - entries.len();
            let weights: Vec<u64> = entries.iter().map(|&i| catalog[i].weight as u64).collect();
            let total: u64 = weights.iter().sum();
            let weights = if total == 0 { vec![1; entries.len()] } else { weights };
            let total: u64 = weights.iter().sum();

            let mut remainders = Vec::with_capacity(entries.len());
            let mut assigned = 0usize;
            for (slot, &weight) in weights.iter().enumerate() {
                let share = remaining as u64 * weight;
                counts[slot] += (share / total) as usize;
                assigned += (share / total) as usize;
                remainders.push((share % total, slot));
            }
            remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            for &(_, slot) in remainders.iter().take(remaining - assigned) {
                counts[slot] += 1;
            }
        }

        let mut vehicles = Vec::with_capacity(counts.iter().sum());
        for (&catalog_index, &count) in entries.iter().zip(&counts) {
            for _ in 0..count {
                let id = VehicleId(vehicles.len());
                vehicles.push(VehicleInstance::from_catalog(id, catalog_index, &catalog[catalog_index]));
            }
        }

        log::info!("Vehicle pool built: {} instances from {} catalog entries", vehicles.len(), entries.len());

        Self {
            idle: (0..vehicles.len()).map(VehicleId).collect(),
            active: Vec::new(),
            vehicles,
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleInstance> {
        self.vehicles.get(id.0)
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut VehicleInstance> {
        self.vehicles.get_mut(id.0)
    }

    pub fn vehicles(&self) -> &[VehicleInstance] {
        &self.vehicles
    }

    pub fn idle_ids(&self) -> &[VehicleId] {
        &self.idle
    }

    pub fn active_ids(&self) -> &[VehicleId] {
        &self.active
    }

    pub fn is_active(&self, id: VehicleId) -> bool {
        self.active.contains(&id)
    }

    pub fn excluded_ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.vehicles.iter().filter(|v| v.excluded).map(|v| v.id)
    }

    /// Move an idle instance to the active set.
    pub fn get_and_remove_vehicle(&mut self, id: VehicleId) -> bool {
        match self.idle.iter().position(|&v| v == id) {
            Some(at) => {
                self.idle.swap_remove(at);
                self.active.push(id);
                true
            }
            None => {
                log::error!("get_and_remove_vehicle: vehicle {} is not idle", id.0);
                false
            }
        }
    }

    /// Return an active instance to the idle set and park it.
    pub fn add_vehicle(&mut self, id: VehicleId) -> bool {
        match self.active.iter().position(|&v| v == id) {
            Some(at) => {
                self.active.remove(at);
                if let Some(vehicle) = self.vehicles.get_mut(id.0) {
                    vehicle.reset();
                }
                self.idle.push(id);
                true
            }
            None => {
                log::error!("add_vehicle: vehicle {} is not active", id.0);
                false
            }
        }
    }

    /// A random idle instance of `vehicle_type` (any type when `None`).
    pub fn idle_vehicle_index<R: Rng>(&self, vehicle_type: Option<VehicleType>, rng: &mut R) -> Option<VehicleId> {
        let candidates: Vec<VehicleId> = self
            .idle
            .iter()
            .copied()
            .filter(|&id| vehicle_type.map_or(true, |t| self.vehicles[id.0].vehicle_type == t))
            .collect();
        let choice = candidates.choose(rng).copied();
        if choice.is_none() {
            log::debug!("No idle vehicle of type {:?}", vehicle_type);
        }
        choice
    }

    /// Hand an instance to an external driver. It leaves both sets.
    ///
    /// Controllers still count the vehicle in any zone it occupies; go
    /// through [`SimulationState::exclude_vehicle`] to release those too.
    ///
    /// [`SimulationState::exclude_vehicle`]: crate::simulation::SimulationState::exclude_vehicle
    pub fn exclude_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.get_mut(id.0) else {
            log::error!("exclude_vehicle: vehicle {} out of range", id.0);
            return false;
        };
        vehicle.excluded = true;
        self.idle.retain(|&v| v != id);
        self.active.retain(|&v| v != id);
        true
    }

    pub fn include_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.get_mut(id.0) else {
            log::error!("include_vehicle: vehicle {} out of range", id.0);
            return false;
        };
        if !vehicle.excluded {
            return false;
        }
        vehicle.excluded = false;
        vehicle.reset();
        self.idle.push(id);
        true
    }
}
