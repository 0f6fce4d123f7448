//! Companion wheel batch: suspension, side grip and visual wheel state,
//! computed from the same tick's drive outputs.

pub const GRAVITY: f32 = 9.81;
/// Compression ratios this close to half travel produce no spring force.
pub const SPRING_DEAD_ZONE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelInput {
    /// Current suspension compression (m), 0 when the wheel is in the air.
    pub compression: f32,
    pub previous_compression: f32,
    pub travel: f32,
    pub radius: f32,
    pub spring: f32,
    pub damper: f32,
    pub side_grip: f32,
    /// Velocity of the contact point along the wheel's axle (m/s).
    pub lateral_velocity: f32,
    pub wheel_count: usize,
    pub forward_speed: f32,
    /// Accumulated spin in degrees.
    pub spin: f32,
    pub steers: bool,
    pub steer_angle: f32,
    /// Mass carried by the whole vehicle.
    pub mass: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelOutput {
    pub suspension_force: f32,
    pub side_force: f32,
    pub spin: f32,
    pub steer_angle: f32,
}

pub struct WheelController;

impl WheelController {
    pub fn compute(input: &WheelInput, dt: f32) -> WheelOutput {
        let wheel_count = input.wheel_count.max(1) as f32;

        let suspension_force = if input.compression <= 0.0 || input.travel <= 0.0 {
            0.0
        } else {
            let support = input.mass * GRAVITY / wheel_count;
            let ratio = input.compression / input.travel;
            let spring = if (ratio - 0.5).abs() < SPRING_DEAD_ZONE {
                0.0
            } else {
                input.spring * (input.compression - input.travel * 0.5)
            };
            let damper = input.damper * (input.compression - input.previous_compression) / dt;
            support + spring + damper
        };

        let side_force = if input.compression > 0.0 {
            -input.lateral_velocity * input.mass * input.side_grip / wheel_count
        } else {
            0.0
        };

        let circumference = 2.0 * std::f32::consts::PI * input.radius;
        let spin = if circumference > 0.0 {
            (input.spin + 360.0 * (input.forward_speed / circumference) * dt).rem_euclid(360.0)
        } else {
            input.spin
        };

        WheelOutput {
            suspension_force,
            side_force,
            spin,
            steer_angle: if input.steers { input.steer_angle } else { 0.0 },
        }
    }

    pub fn run_batch(inputs: &[WheelInput], dt: f32) -> Vec<WheelOutput> {
        inputs.iter().map(|input| Self::compute(input, dt)).collect()
    }
}
