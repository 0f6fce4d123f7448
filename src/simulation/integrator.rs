use nalgebra::{Rotation3, Vector3};

use super::{flat, Vec3, VehicleInstance};

/// Applies a tick's drive outputs to a vehicle body. Hosts plug in their own
/// physics engine here.
pub trait PhysicsIntegrator {
    fn integrate(&mut self, vehicle: &mut VehicleInstance, dt: f32);
}

/// Flat-ground kinematic body: `v' = (v + a·dt)(1 - drag·dt)` along the
/// heading, yaw from a bicycle model.
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicIntegrator;

impl PhysicsIntegrator for KinematicIntegrator {
    fn integrate(&mut self, vehicle: &mut VehicleInstance, dt: f32) {
        let output = vehicle.output;
        let drag = vehicle.tunables.drag;
        let wheelbase = vehicle.wheelbase();
        let state = &mut vehicle.state;

        let forward = flat(state.forward).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        let speed = state.velocity.dot(&forward);
        let speed = (speed + output.acceleration * dt) * (1.0 - drag * dt);

        let yaw_rate = if wheelbase > f32::EPSILON {
            speed / wheelbase * output.steer_angle.to_radians().tan()
        } else {
            0.0
        };
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), yaw_rate * dt);

        state.forward = rotation * forward;
        state.velocity = state.forward * speed;
        state.position += state.velocity * dt;

        if let Some(trailer) = vehicle.trailer {
            state.trailer_speed =
                (state.trailer_speed + output.trailer_acceleration * dt) * (1.0 - trailer.drag * dt);
        }

        // Flat ground keeps every wheel at rest height.
        for wheel in vehicle.wheels.iter_mut() {
            wheel.previous_compression = wheel.compression;
            wheel.compression = wheel.travel * 0.5;
            wheel.lateral_velocity = 0.0;
        }
    }
}
