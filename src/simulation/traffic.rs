use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{
    BatchContext, ClearLineOfSight, DriveAction, DriveInput, DriveOutput, Footprint, FootprintIndex, LineOfSight,
    ObstacleInput, ObstacleSource, PositionValidator, RoadSide, SimulationState, TrafficEvent, TrailerInput,
    VehicleId, VehiclePositioningSystem, WaypointId, WheelInput, WheelOutput,
};
use crate::config::{SpawnSettings, VehicleType, VehiclesConfig};

/// An obstacle moving faster than this is followed rather than stopped for.
const FOLLOW_MIN_SPEED: f32 = 0.5;
/// Spawned vehicles start at this share of the lane's speed limit.
const SPAWN_SPEED_FACTOR: f32 = 0.5;

/// Drive inputs of every active agent, captured before the batch runs.
#[derive(Debug, Clone, Default)]
pub struct DriveBatch {
    pub vehicles: Vec<VehicleId>,
    pub inputs: Vec<DriveInput>,
}

#[derive(Debug, Clone, Default)]
pub struct WheelBatch {
    /// Vehicle and wheel index of each input.
    pub slots: Vec<(VehicleId, usize)>,
    pub inputs: Vec<WheelInput>,
}

/// The sequential half of a tick: intersection timers, target selection,
/// action resolution, spawning and despawning. All cross-agent state is
/// mutated here, never inside a batch.
pub struct TrafficManager {
    spawning: SpawnSettings,
    active_radius: f32,
    max_active: usize,
    spawn_interval: f32,
    spawn_timer: f32,
    type_weights: Vec<(VehicleType, u32)>,
    validator: PositionValidator,
    positioning: VehiclePositioningSystem,
    line_of_sight: Box<dyn LineOfSight>,
    rng: StdRng,
}

impl TrafficManager {
    pub fn new(vehicles: &VehiclesConfig, seed: Option<u64>) -> Self {
        let rng = if let Some(seed) = seed {
            StdRng::seed_from_u64(seed)
        } else {
            StdRng::from_entropy()
        };

        let type_weights = vehicles
            .catalog
            .iter()
            .filter(|entry| !entry.dont_instantiate)
            .map(|entry| (entry.vehicle_type, entry.weight))
            .collect();

        Self {
            spawning: vehicles.spawning.clone(),
            active_radius: vehicles.intersections.active_radius,
            max_active: vehicles.simulation.max_active_vehicles as usize,
            spawn_interval: vehicles.simulation.spawn_interval,
            spawn_timer: 0.0,
            type_weights,
            validator: PositionValidator::new(&vehicles.spawning),
            positioning: VehiclePositioningSystem::default(),
            line_of_sight: Box::new(ClearLineOfSight),
            rng,
        }
    }

    pub fn set_line_of_sight(&mut self, line_of_sight: Box<dyn LineOfSight>) {
        self.line_of_sight = line_of_sight;
    }

    pub fn validator(&self) -> &PositionValidator {
        &self.validator
    }

    pub fn batch_context<'a>(&self, state: &'a SimulationState) -> BatchContext<'a> {
        BatchContext {
            dt: state.dt,
            viewpoints: &state.viewpoints,
            remove_distance_sq: self.spawning.remove_distance * self.spawning.remove_distance,
        }
    }

    /// Advance the clock and intersections, move agents to their next
    /// targets and resolve their actions. Returns the drive batch.
    pub fn prepare(&mut self, state: &mut SimulationState) -> DriveBatch {
        state.time += state.dt;
        state.tick += 1;

        if !state.viewpoints.is_empty() {
            state.intersections.update_active(
                &state.viewpoints,
                self.active_radius,
                &state.graph,
                &mut state.events,
            );
        }
        state.intersections.update(state.time, &mut state.graph, &mut state.events);

        let active: Vec<VehicleId> = state.pool.active_ids().to_vec();
        for &id in &active {
            let advance = state.vehicle(id).map_or(false, |v| v.output.advance_waypoint);
            if advance {
                self.advance_target(state, id);
            }
        }

        let occupied: HashSet<WaypointId> = active
            .iter()
            .filter_map(|&id| state.vehicle(id).and_then(|v| v.target))
            .collect();

        let mut batch = DriveBatch::default();
        for &id in &active {
            self.resolve_actions(state, id, &occupied);
            if let Some(input) = Self::drive_input(state, id) {
                batch.vehicles.push(id);
                batch.inputs.push(input);
            }
        }
        batch
    }

    /// Reached the current target: do intersection bookkeeping and pick the
    /// next waypoint.
    fn advance_target(&mut self, state: &mut SimulationState, id: VehicleId) {
        let Some(vehicle) = state.pool.vehicle(id) else {
            return;
        };
        let Some(reached) = vehicle.target else {
            return;
        };
        let vehicle_type = vehicle.vehicle_type;
        let inside = vehicle.intersections.clone();

        // Zones without exit waypoints (crossings) end one waypoint past
        // their stop line.
        let mut left = Vec::new();
        for &intersection_id in &inside {
            let leaving = match state.intersections.get(intersection_id) {
                Some(intersection) => {
                    let controller = intersection.controller();
                    let exits = controller.exit_waypoints();
                    if exits.is_empty() {
                        !controller.is_stop_waypoint(reached)
                    } else {
                        exits.contains(&reached)
                    }
                }
                None => true,
            };
            if leaving {
                left.push(intersection_id);
            }
        }
        for &intersection_id in &left {
            state.intersections.vehicle_left(intersection_id, id);
        }

        let mut entered = Vec::new();
        for &intersection_id in state.graph.intersections(reached) {
            if inside.contains(&intersection_id) && !left.contains(&intersection_id) {
                continue;
            }
            let Some(intersection) = state.intersections.get(intersection_id) else {
                continue;
            };
            if intersection.controller().is_stop_waypoint(reached) {
                entered.push(intersection_id);
            }
        }
        for &intersection_id in &entered {
            state.intersections.vehicle_enter(intersection_id, id);
        }

        if state.graph.is_trigger_event(reached) {
            state.events.publish(TrafficEvent::WaypointEventReached {
                vehicle: id,
                waypoint: reached,
                data: state.graph.event_data(reached).map(str::to_string),
            });
        }

        let candidates = state.graph.neighbors_filtered(reached, Some(vehicle_type));
        let next = candidates.choose(&mut self.rng).copied();

        let Some(vehicle) = state.pool.vehicle_mut(id) else {
            return;
        };
        vehicle.intersections.retain(|i| !left.contains(i));
        vehicle.intersections.extend(entered);

        match next {
            Some(next) => {
                vehicle.previous_target = Some(reached);
                vehicle.target = Some(next);
                vehicle.actions.remove(DriveAction::NoWaypoint);
            }
            None => {
                if !vehicle.actions.contains(DriveAction::NoWaypoint) {
                    log::debug!("Vehicle {} reached the end of the graph at waypoint {}", id.0, reached.0);
                    vehicle.actions.add(DriveAction::NoWaypoint, RoadSide::Any);
                    state.events.publish(TrafficEvent::DestinationReached {
                        vehicle: id,
                        waypoint: reached,
                    });
                }
            }
        }
    }

    fn resolve_actions(&mut self, state: &mut SimulationState, id: VehicleId, occupied: &HashSet<WaypointId>) {
        let Some(vehicle) = state.pool.vehicle(id) else {
            return;
        };
        let target = vehicle.target;
        let obstacle = vehicle.obstacle;
        let was_giving_way = vehicle.giving_way;

        let mut must_stop = false;
        let mut give_way = false;
        if let Some(target) = target {
            // Every controller gating the target gets asked, so requests register.
            let gates: Vec<_> = state
                .graph
                .intersections(target)
                .iter()
                .copied()
                .filter(|&i| {
                    state
                        .intersections
                        .get(i)
                        .map_or(false, |c| c.controller().is_stop_waypoint(target))
                })
                .collect();
            let mut free = !state.graph.is_stop(target) || !gates.is_empty();
            for gate in gates {
                free &= state
                    .intersections
                    .is_path_free(gate, target, &mut state.graph, &mut state.events);
            }
            must_stop = !free;

            if state.graph.is_give_way(target) {
                let required = if state.graph.is_complex_give_way(target) {
                    state.graph.give_way_list(target)
                } else {
                    state.graph.neighbors(target)
                };
                give_way = required.iter().any(|wp| occupied.contains(wp));
            }
        }

        // Vehicles behind us do not hold us up.
        let obstacle = obstacle.filter(|o| match o.source {
            ObstacleSource::Vehicle(other) if other != id => {
                !self.positioning.is_in_front_of(&state.graph, &state.pool, id, other)
            }
            _ => true,
        });

        let Some(vehicle) = state.pool.vehicle_mut(id) else {
            return;
        };

        let toggle = |actions: &mut super::ActiveActions, action: DriveAction, on: bool| {
            if on {
                actions.add(action, RoadSide::Any);
            } else {
                actions.remove(action);
            }
        };
        toggle(&mut vehicle.actions, DriveAction::StopInPoint, must_stop);
        toggle(&mut vehicle.actions, DriveAction::GiveWay, give_way);
        toggle(&mut vehicle.actions, DriveAction::NoPath, target.is_none());

        let following = obstacle.map_or(false, |o| o.speed.map_or(false, |s| s > FOLLOW_MIN_SPEED));
        toggle(&mut vehicle.actions, DriveAction::Follow, obstacle.is_some() && following);
        toggle(&mut vehicle.actions, DriveAction::StopInDistance, obstacle.is_some() && !following);

        if give_way != was_giving_way {
            vehicle.giving_way = give_way;
            state.events.publish(TrafficEvent::GiveWayStateChanged {
                vehicle: id,
                waiting: give_way,
            });
        }

        let (action, side) = vehicle.actions.current();
        if (action, side) != (vehicle.action, vehicle.side) {
            log::debug!("Vehicle {} action {:?} -> {:?}", id.0, vehicle.action, action);
            vehicle.action = action;
            vehicle.side = side;
            state.events.publish(TrafficEvent::DriveActionChanged {
                vehicle: id,
                action,
                side,
            });
        }
    }

    fn drive_input(state: &SimulationState, id: VehicleId) -> Option<DriveInput> {
        let vehicle = state.vehicle(id)?;
        let graph = &state.graph;

        let (target, next_target, target_speed) = match vehicle.target {
            Some(target) => (
                graph.position(target),
                graph
                    .neighbors_filtered(target, Some(vehicle.vehicle_type))
                    .first()
                    .map(|&next| graph.position(next)),
                graph.max_speed(target).min(vehicle.max_speed),
            ),
            None => (vehicle.state.position + vehicle.state.forward, None, 0.0),
        };

        let obstacle = vehicle.obstacle.map(|o| ObstacleInput {
            position: o.position,
            speed: o.speed,
        });

        Some(DriveInput {
            action: vehicle.action,
            side: vehicle.side,
            position: vehicle.state.position,
            forward: vehicle.state.forward,
            velocity: vehicle.state.velocity,
            target,
            next_target,
            target_speed,
            obstacle,
            steer_angle: vehicle.steer_angle,
            gear: vehicle.gear,
            tunables: vehicle.tunables,
            length: vehicle.length,
            mass: vehicle.mass,
            trailer: vehicle.trailer.map(|t| TrailerInput {
                mass: t.mass,
                drag: t.drag,
                speed: vehicle.state.trailer_speed,
            }),
        })
    }

    pub fn apply_drive_outputs(&mut self, state: &mut SimulationState, batch: &DriveBatch, outputs: Vec<DriveOutput>) {
        for (&id, output) in batch.vehicles.iter().zip(outputs) {
            if let Some(vehicle) = state.pool.vehicle_mut(id) {
                vehicle.output = output;
                vehicle.steer_angle = output.steer_angle;
                vehicle.gear = output.gear;
            }
        }
    }

    pub fn wheel_batch(&self, state: &SimulationState) -> WheelBatch {
        let mut batch = WheelBatch::default();
        for &id in state.pool.active_ids() {
            let Some(vehicle) = state.vehicle(id) else {
                continue;
            };
            let forward_speed = vehicle.state.forward_speed();
            for (index, wheel) in vehicle.wheels.iter().enumerate() {
                batch.slots.push((id, index));
                batch.inputs.push(WheelInput {
                    compression: wheel.compression,
                    previous_compression: wheel.previous_compression,
                    travel: wheel.travel,
                    radius: wheel.radius,
                    spring: vehicle.tunables.spring,
                    damper: vehicle.tunables.damper,
                    side_grip: vehicle.tunables.side_grip,
                    lateral_velocity: wheel.lateral_velocity,
                    wheel_count: vehicle.wheels.len(),
                    forward_speed,
                    spin: wheel.spin,
                    steers: wheel.steers,
                    steer_angle: vehicle.steer_angle,
                    mass: vehicle.total_mass(),
                });
            }
        }
        batch
    }

    pub fn apply_wheel_outputs(&mut self, state: &mut SimulationState, batch: &WheelBatch, outputs: Vec<WheelOutput>) {
        for (&(id, index), output) in batch.slots.iter().zip(outputs) {
            if let Some(wheel) = state.pool.vehicle_mut(id).and_then(|v| v.wheels.get_mut(index)) {
                wheel.spin = output.spin;
                wheel.output = output;
            }
        }
    }

    /// Despawn, spawn and deliver this tick's events.
    pub fn finish(&mut self, state: &mut SimulationState) {
        self.despawn_far_vehicles(state);

        self.spawn_timer += state.dt;
        if self.spawn_timer >= self.spawn_interval {
            self.spawn_timer = 0.0;
            self.try_spawn(state);
        }

        state.events.dispatch();
    }

    fn despawn_far_vehicles(&mut self, state: &mut SimulationState) {
        let removable: Vec<VehicleId> = state
            .pool
            .active_ids()
            .iter()
            .copied()
            .filter(|&id| state.vehicle(id).map_or(false, |v| v.output.ready_to_remove))
            .collect();

        for id in removable {
            state.release_intersections(id);
            if state.pool.add_vehicle(id) {
                log::debug!("Despawned vehicle {} (out of range of every viewpoint)", id.0);
            }
        }
    }

    fn try_spawn(&mut self, state: &mut SimulationState) {
        if state.active_vehicles() >= self.max_active {
            return;
        }
        let Some(&viewpoint) = state.viewpoints.choose(&mut self.rng) else {
            log::debug!("No viewpoints; skipping spawn");
            return;
        };

        let min_sq = self.spawning.min_spawn_distance * self.spawning.min_spawn_distance;
        let candidates: Vec<WaypointId> = state
            .graph
            .waypoints_within(&viewpoint, self.spawning.max_spawn_distance)
            .into_iter()
            .filter(|&wp| {
                (state.graph.position(wp) - viewpoint).norm_squared() >= min_sq
                    && !state.graph.is_temporarily_disabled(wp)
                    && !state.graph.neighbors(wp).is_empty()
            })
            .collect();
        let Some(&waypoint) = candidates.choose(&mut self.rng) else {
            log::debug!("No spawn waypoint in the ring around the viewpoint");
            return;
        };

        let vehicle_type = self.pick_vehicle_type();
        if !state.graph.allows(waypoint, vehicle_type) {
            log::debug!("Waypoint {} does not allow {:?}; skipping spawn", waypoint.0, vehicle_type);
            return;
        }
        self.spawn_vehicle(state, Some(vehicle_type), waypoint);
    }

    fn pick_vehicle_type(&mut self) -> VehicleType {
        let total_weight: u32 = self.type_weights.iter().map(|(_, w)| w).sum();
        if total_weight == 0 {
            return self.type_weights.first().map_or(VehicleType::Car, |(t, _)| *t);
        }
        let mut random_value = self.rng.gen_range(0..total_weight);
        for &(vehicle_type, weight) in &self.type_weights {
            if random_value < weight {
                return vehicle_type;
            }
            random_value -= weight;
        }
        VehicleType::Car
    }

    /// Activate an idle vehicle of `vehicle_type` (any when `None`) at
    /// `waypoint`, if the pose passes validation.
    pub fn spawn_vehicle(
        &mut self,
        state: &mut SimulationState,
        vehicle_type: Option<VehicleType>,
        waypoint: WaypointId,
    ) -> Option<VehicleId> {
        let id = state.pool.idle_vehicle_index(vehicle_type, &mut self.rng)?;
        self.spawn_vehicle_at(state, id, waypoint).then_some(id)
    }

    pub fn spawn_vehicle_at(&mut self, state: &mut SimulationState, id: VehicleId, waypoint: WaypointId) -> bool {
        let Some(vehicle) = state.vehicle(id) else {
            log::error!("spawn_vehicle_at: vehicle {} out of range", id.0);
            return false;
        };
        let vehicle_type = vehicle.vehicle_type;

        let candidates = state.graph.neighbors_filtered(waypoint, Some(vehicle_type));
        let Some(&target) = candidates.choose(&mut self.rng) else {
            log::debug!("Waypoint {} has no usable successor; skipping spawn", waypoint.0);
            return false;
        };

        let position = state.graph.position(waypoint);
        let heading = super::flat(state.graph.position(target) - position);
        let forward = heading.try_normalize(f32::EPSILON).unwrap_or_else(super::Vec3::z);

        let mut parked = vehicle.clone();
        parked.state.position = position;
        parked.state.forward = forward;
        let body = parked.footprint();
        let trailer = parked.trailer_footprint();

        let mut others: Vec<Footprint> = Vec::new();
        for &other in state.pool.active_ids() {
            if let Some(v) = state.vehicle(other) {
                others.push(v.footprint());
                others.extend(v.trailer_footprint());
            }
        }
        others.extend(state.pool.excluded_ids().filter_map(|e| state.vehicle(e)).map(|v| v.footprint()));
        others.extend(state.obstacles.iter().copied());
        let others = FootprintIndex::new(others);

        if !self.validator.can_activate(
            &body,
            trailer.as_ref(),
            &others,
            &state.viewpoints,
            self.line_of_sight.as_ref(),
        ) {
            log::debug!("Spawn of vehicle {} at waypoint {} rejected by the validator", id.0, waypoint.0);
            return false;
        }

        if !state.pool.get_and_remove_vehicle(id) {
            return false;
        }

        let speed = state.graph.max_speed(waypoint).min(parked.max_speed) * SPAWN_SPEED_FACTOR;
        if let Some(vehicle) = state.pool.vehicle_mut(id) {
            vehicle.state.position = position;
            vehicle.state.forward = forward;
            vehicle.state.velocity = forward * speed;
            vehicle.state.trailer_speed = if vehicle.trailer.is_some() { speed } else { 0.0 };
            vehicle.previous_target = Some(waypoint);
            vehicle.target = Some(target);
        }

        log::debug!("Spawned vehicle {} at waypoint {} heading to {}", id.0, waypoint.0, target.0);
        true
    }
}
