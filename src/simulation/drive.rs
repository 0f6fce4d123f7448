//! Per-tick drive computation.
//!
//! [`DriveController::compute`] is a pure function of one agent's snapshot
//! plus read-only batch data, so the batch can be mapped over agents in any
//! order or on any number of threads.

use super::{flat, signed_angle_deg, DriveAction, Point, RoadSide, Vec3, KMH_TO_MS};
use crate::config::DriveTunables;

/// Speed below which the gearbox may switch direction (m/s).
pub const GEAR_SWITCH_EPSILON: f32 = 0.1;
/// Heading error under which the wheels are straightened onto the target.
pub const STRAIGHTEN_ANGLE: f32 = 5.0;
/// Turns sharper than this get extra braking.
pub const TURN_BRAKE_ANGLE: f32 = 5.0;
pub const ADVANCE_DISTANCE: f32 = 1.5;
const FAST_SPEED: f32 = 50.0 * KMH_TO_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gear {
    #[default]
    Drive,
    Reverse,
}

impl Gear {
    pub fn sign(self) -> f32 {
        match self {
            Gear::Drive => 1.0,
            Gear::Reverse => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleInput {
    pub position: Point,
    /// Speed of the obstacle along this agent's heading; `None` when static.
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailerInput {
    pub mass: f32,
    pub drag: f32,
    pub speed: f32,
}

/// Snapshot of one agent taken before the batch starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveInput {
    pub action: DriveAction,
    pub side: RoadSide,
    pub position: Point,
    pub forward: Vec3,
    pub velocity: Vec3,
    pub target: Point,
    /// Waypoint after the target, used to anticipate the turn.
    pub next_target: Option<Point>,
    /// Already limited by the vehicle's own max speed.
    pub target_speed: f32,
    pub obstacle: Option<ObstacleInput>,
    pub steer_angle: f32,
    pub gear: Gear,
    pub tunables: DriveTunables,
    pub length: f32,
    pub mass: f32,
    pub trailer: Option<TrailerInput>,
}

/// Read-only data shared by every agent of a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub dt: f32,
    pub viewpoints: &'a [Point],
    pub remove_distance_sq: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveOutput {
    /// Along the body's forward axis (m/s²).
    pub acceleration: f32,
    /// Longitudinal force for the physics integrator, trailer included (N).
    pub force: f32,
    pub trailer_acceleration: f32,
    /// Degrees, positive to the right.
    pub steer_angle: f32,
    pub gear: Gear,
    /// Unsigned speed commanded for the end of this tick.
    pub requested_speed: f32,
    pub advance_waypoint: bool,
    pub ready_to_remove: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Longitudinal {
    /// Reach this speed (unsigned, in the current gear) by the end of the tick.
    Hold(f32),
    Coast,
}

/// Brake needed this tick to stop within `distance`, or `None` to coast.
///
/// Compares frames-to-stop at `brake_step` per frame with frames-to-reach
/// at the current closing speed; when stopping would take longer, the brake
/// is scaled up by their ratio. Never exceeds `closing`.
pub fn frame_ratio_brake(closing: f32, distance: f32, brake_step: f32, dt: f32) -> Option<f32> {
    if closing <= 0.0 {
        return None;
    }
    if distance <= 0.0 {
        return Some(closing);
    }
    let frames_to_stop = closing / brake_step;
    let frames_to_reach = distance / (closing * dt);
    if frames_to_stop >= frames_to_reach {
        Some((brake_step * frames_to_stop / frames_to_reach).min(closing))
    } else {
        None
    }
}

pub struct DriveController;

impl DriveController {
    pub fn compute(input: &DriveInput, ctx: &BatchContext) -> DriveOutput {
        let dt = ctx.dt;
        let tunables = &input.tunables;
        let forward = flat(input.forward).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        let signed_speed = input.velocity.dot(&forward);

        let desired_gear = if input.action.is_reverse() { Gear::Reverse } else { Gear::Drive };
        let mut gear = input.gear;
        if gear != desired_gear && signed_speed.abs() <= GEAR_SWITCH_EPSILON {
            gear = desired_gear;
        }
        let speed = (signed_speed * gear.sign()).max(0.0);

        let to_target = flat(input.target - input.position);
        let target_distance = to_target.norm();
        let passed = to_target.dot(&forward) < 0.0;

        let longitudinal = if gear != desired_gear {
            // Shed speed before the gearbox may reverse.
            Longitudinal::Hold((speed - tunables.brake_step).max(0.0))
        } else {
            Self::longitudinal(input, speed, target_distance, passed, dt)
        };

        let (acceleration, trailer_acceleration, requested_speed) = match longitudinal {
            Longitudinal::Hold(next) => {
                let commanded = gear.sign() * next;
                let acceleration = (commanded / (1.0 - tunables.drag * dt) - signed_speed) / dt;
                let trailer_acceleration = input
                    .trailer
                    .map_or(0.0, |t| (commanded / (1.0 - t.drag * dt) - t.speed) / dt);
                (acceleration, trailer_acceleration, next)
            }
            Longitudinal::Coast => (0.0, 0.0, speed * (1.0 - tunables.drag * dt)),
        };
        let force = acceleration * input.mass + input.trailer.map_or(0.0, |t| trailer_acceleration * t.mass);

        let steer_angle = Self::steer(input, gear, speed, target_distance, dt);

        let holding = matches!(input.action, DriveAction::StopInPoint | DriveAction::GiveWay) && !passed;
        let advance_waypoint = !holding && Self::should_advance(input, gear, speed, to_target);

        DriveOutput {
            acceleration,
            force,
            trailer_acceleration,
            steer_angle,
            gear,
            requested_speed,
            advance_waypoint,
            ready_to_remove: Self::is_removable(&input.position, ctx),
        }
    }

    fn longitudinal(input: &DriveInput, speed: f32, target_distance: f32, passed: bool, dt: f32) -> Longitudinal {
        let tunables = &input.tunables;
        let brake_to = |stop_distance: f32, closing: f32, floor: f32| match frame_ratio_brake(
            closing,
            stop_distance,
            tunables.brake_step,
            dt,
        ) {
            Some(brake) => Longitudinal::Hold((speed - brake).max(floor)),
            None => Longitudinal::Coast,
        };
        let obstacle_gap = |obstacle: &ObstacleInput| {
            flat(obstacle.position - input.position).norm() - input.length * 0.5 - tunables.stop_margin
        };

        match input.action {
            DriveAction::StopNow | DriveAction::NoWaypoint | DriveAction::NoPath => {
                Longitudinal::Hold((speed - tunables.brake_step).max(0.0))
            }
            DriveAction::StopInDistance => match &input.obstacle {
                Some(obstacle) => brake_to(obstacle_gap(obstacle), speed, 0.0),
                None => Self::cruise(input, speed, target_distance, dt),
            },
            DriveAction::StopInPoint | DriveAction::GiveWay => {
                let stop_distance = target_distance - input.length * 0.5;
                if passed {
                    Self::cruise(input, speed, target_distance, dt)
                } else {
                    match brake_to(stop_distance, speed, 0.0) {
                        // Creep up to the stop line.
                        Longitudinal::Coast if stop_distance > tunables.stop_margin => {
                            Self::cruise(input, speed, target_distance, dt)
                        }
                        command => command,
                    }
                }
            }
            DriveAction::Follow | DriveAction::Overtake => match &input.obstacle {
                Some(obstacle) => {
                    let lead_speed = obstacle.speed.unwrap_or(0.0).max(0.0);
                    if speed < lead_speed {
                        Self::approach(speed, lead_speed.min(input.target_speed), tunables)
                    } else {
                        brake_to(obstacle_gap(obstacle), speed - lead_speed, lead_speed)
                    }
                }
                None => Self::cruise(input, speed, target_distance, dt),
            },
            DriveAction::Reverse | DriveAction::AvoidReverse => {
                Self::approach(speed, tunables.reverse_speed, tunables)
            }
            DriveAction::Forward | DriveAction::AvoidForward => Self::cruise(input, speed, target_distance, dt),
        }
    }

    fn approach(speed: f32, desired: f32, tunables: &DriveTunables) -> Longitudinal {
        if speed < desired {
            Longitudinal::Hold((speed + tunables.power_step).min(desired))
        } else {
            Longitudinal::Hold((speed - tunables.brake_step).max(desired))
        }
    }

    /// Drive toward the target's speed limit, slowing ahead of sharp turns.
    fn cruise(input: &DriveInput, speed: f32, target_distance: f32, dt: f32) -> Longitudinal {
        let tunables = &input.tunables;
        let desired = input.target_speed.max(0.0);

        let inbound = input.target - input.position;
        let turn = match input.next_target {
            Some(next) => signed_angle_deg(&inbound, &(next - input.target)),
            None => signed_angle_deg(&input.forward, &inbound),
        }
        .abs();

        if turn > TURN_BRAKE_ANGLE {
            let comfortable = desired * (1.0 - turn / 180.0).powi(2);
            if speed > comfortable {
                let deceleration = tunables.brake_step / dt;
                let braking_distance = (speed * speed - comfortable * comfortable) / (2.0 * deceleration);
                if target_distance < 1.5 * braking_distance {
                    return Longitudinal::Hold((speed - tunables.brake_step).max(comfortable));
                }
            }
        }

        Self::approach(speed, desired, tunables)
    }

    fn steer(input: &DriveInput, gear: Gear, speed: f32, target_distance: f32, dt: f32) -> f32 {
        let tunables = &input.tunables;
        let max_steer = tunables.max_steer;
        let current = input.steer_angle;

        let side = match input.side {
            RoadSide::Left => -1.0,
            RoadSide::Right | RoadSide::Any => 1.0,
        };
        let target_angle = match input.action {
            DriveAction::AvoidForward => side * max_steer,
            DriveAction::AvoidReverse => -side * max_steer,
            DriveAction::Reverse => 0.0,
            _ => {
                let mut heading = signed_angle_deg(&input.forward, &(input.target - input.position));
                if gear == Gear::Reverse {
                    heading = -heading;
                }
                // Nearly on course: snap instead of rate limiting.
                if heading.abs() < STRAIGHTEN_ANGLE {
                    return heading.clamp(-max_steer, max_steer);
                }
                heading.clamp(-max_steer, max_steer)
            }
        };

        let mut step = tunables.steer_step;
        if speed > FAST_SPEED {
            step *= speed / FAST_SPEED;
        }

        let remaining = target_angle - current;
        if speed > GEAR_SWITCH_EPSILON && target_distance > 0.0 {
            let frames_to_rotate = remaining.abs() / step;
            let frames_to_reach = target_distance / (speed * dt);
            if frames_to_reach > 0.0 && frames_to_rotate > frames_to_reach {
                step *= frames_to_rotate / frames_to_reach;
            }
        }

        (current + remaining.clamp(-step, step)).clamp(-max_steer, max_steer)
    }

    /// Advance threshold is 1.5 m up to 50 km/h and grows linearly above it.
    pub fn advance_threshold(speed: f32) -> f32 {
        let kmh = speed / KMH_TO_MS;
        if kmh <= 50.0 {
            ADVANCE_DISTANCE
        } else {
            ADVANCE_DISTANCE + (kmh - 50.0) * 0.05
        }
    }

    fn should_advance(input: &DriveInput, gear: Gear, speed: f32, to_target: Vec3) -> bool {
        let distance = to_target.norm();
        let threshold = Self::advance_threshold(speed);
        if distance < threshold {
            return true;
        }
        let heading = flat(input.forward) * gear.sign();
        let passed = heading.dot(&to_target) < 0.0;
        passed && distance < 2.0 * threshold.max(input.length)
    }

    fn is_removable(position: &Point, ctx: &BatchContext) -> bool {
        !ctx.viewpoints.is_empty()
            && ctx
                .viewpoints
                .iter()
                .all(|viewpoint| (viewpoint - position).norm_squared() > ctx.remove_distance_sq)
    }

    /// Sequential reference batch.
    pub fn run_batch(inputs: &[DriveInput], ctx: &BatchContext) -> Vec<DriveOutput> {
        inputs.iter().map(|input| Self::compute(input, ctx)).collect()
    }
}
