use serde::{Deserialize, Serialize};
use anyhow::Result;
use super::{invalid, Validate};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehiclesConfig {
    pub simulation: SimulationParams,
    pub catalog: Vec<CatalogEntry>,
    #[serde(default)]
    pub spawning: SpawnSettings,
    #[serde(default)]
    pub intersections: IntersectionSettings,
    #[serde(default)]
    pub random: RandomConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationParams {
    pub tick: f32, // seconds
    pub max_active_vehicles: u32,
    pub pool_capacity: u32,
    pub spawn_interval: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Van,
    Bus,
    Truck,
    Motorcycle,
    Bicycle,
    Emergency,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub vehicle_type: VehicleType,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub dont_instantiate: bool,
    pub length: f32,
    pub width: f32,
    #[serde(default = "default_height")]
    pub height: f32,
    pub mass: f32,
    pub max_speed: f32,
    #[serde(default)]
    pub drive: DriveTunables,
    #[serde(default)]
    pub wheels: Vec<WheelConfig>,
    #[serde(default)]
    pub trailer: Option<TrailerConfig>,
}

/// Per-vehicle constants of the drive controller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriveTunables {
    /// Maximum speed gained per tick (m/s).
    pub power_step: f32,
    /// Maximum speed shed per tick (m/s).
    pub brake_step: f32,
    pub drag: f32,
    /// Degrees.
    pub max_steer: f32,
    /// Degrees per tick below 50 km/h.
    pub steer_step: f32,
    pub reverse_speed: f32,
    pub stop_margin: f32,
    pub side_grip: f32,
    pub spring: f32,
    pub damper: f32,
}

impl Default for DriveTunables {
    fn default() -> Self {
        Self {
            power_step: 0.1,
            brake_step: 0.3,
            drag: 0.05,
            max_steer: 30.0,
            steer_step: 1.5,
            reverse_speed: 3.0,
            stop_margin: 2.0,
            side_grip: 1.0,
            spring: 35000.0,
            damper: 4500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WheelConfig {
    pub position: [f32; 3],
    pub radius: f32,
    #[serde(default = "default_suspension_travel")]
    pub suspension_travel: f32,
    #[serde(default)]
    pub steer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TrailerConfig {
    pub length: f32,
    pub width: f32,
    pub mass: f32,
    #[serde(default)]
    pub drag: f32,
    #[serde(default)]
    pub hitch_offset: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpawnSettings {
    pub safe_spawn_radius: f32,
    pub min_spawn_distance: f32,
    pub max_spawn_distance: f32,
    pub remove_distance: f32,
    /// Extra gap kept around a candidate footprint.
    pub clearance: f32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            safe_spawn_radius: 50.0,
            min_spawn_distance: 60.0,
            max_spawn_distance: 150.0,
            remove_distance: 200.0,
            clearance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntersectionSettings {
    /// Upper bound of the random start offset of light crossings.
    pub crossing_jitter: f32,
    /// Intersections farther than this from every viewpoint are not updated.
    pub active_radius: f32,
}

impl Default for IntersectionSettings {
    fn default() -> Self {
        Self {
            crossing_jitter: 10.0,
            active_radius: 250.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RandomConfig {
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
    pub timing_samples: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { timing_samples: 100 }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_height() -> f32 {
    1.5
}

fn default_suspension_travel() -> f32 {
    0.3
}

impl Validate for VehiclesConfig {
    fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        if sim.tick <= 0.0 {
            return invalid("Tick length must be positive");
        }

        if sim.pool_capacity == 0 {
            return invalid("Pool capacity must be greater than zero");
        }

        if sim.max_active_vehicles > sim.pool_capacity {
            return invalid(format!(
                "Max active vehicles ({}) exceeds pool capacity ({})",
                sim.max_active_vehicles, sim.pool_capacity
            ));
        }

        if sim.spawn_interval <= 0.0 {
            return invalid("Spawn interval must be positive");
        }

        if self.catalog.iter().all(|entry| entry.dont_instantiate) {
            return invalid("At least one catalog entry must be instantiable");
        }

        for entry in &self.catalog {
            if entry.length <= 0.0 || entry.width <= 0.0 || entry.height <= 0.0 {
                return invalid(format!("Vehicle '{}' dimensions must be positive", entry.name));
            }

            if entry.mass <= 0.0 {
                return invalid(format!("Vehicle '{}' mass must be positive", entry.name));
            }

            if entry.max_speed <= 0.0 {
                return invalid(format!("Vehicle '{}' max speed must be positive", entry.name));
            }

            let drive = &entry.drive;
            if drive.power_step <= 0.0 || drive.brake_step <= 0.0 {
                return invalid(format!("Vehicle '{}' power and brake steps must be positive", entry.name));
            }

            // The drag compensation divides by (1 - drag * dt)
            if drive.drag < 0.0 || drive.drag * sim.tick >= 1.0 {
                return invalid(format!("Vehicle '{}' drag must be in [0, 1/tick)", entry.name));
            }

            if drive.max_steer <= 0.0 || drive.steer_step <= 0.0 {
                return invalid(format!("Vehicle '{}' steering limits must be positive", entry.name));
            }

            for wheel in &entry.wheels {
                if wheel.radius <= 0.0 || wheel.suspension_travel <= 0.0 {
                    return invalid(format!("Vehicle '{}' wheel radius and travel must be positive", entry.name));
                }
            }

            if let Some(trailer) = &entry.trailer {
                if trailer.mass <= 0.0 || trailer.length <= 0.0 || trailer.width <= 0.0 {
                    return invalid(format!("Vehicle '{}' trailer dimensions and mass must be positive", entry.name));
                }
                if trailer.drag < 0.0 || trailer.drag * sim.tick >= 1.0 {
                    return invalid(format!("Vehicle '{}' trailer drag must be in [0, 1/tick)", entry.name));
                }
            }
        }

        let spawning = &self.spawning;
        if spawning.min_spawn_distance > spawning.max_spawn_distance {
            return invalid("Minimum spawn distance must not exceed maximum spawn distance");
        }

        if spawning.remove_distance <= 0.0 {
            return invalid("Remove distance must be positive");
        }

        if self.intersections.crossing_jitter < 0.0 {
            return invalid("Crossing jitter must be non-negative");
        }

        if self.performance.timing_samples == 0 {
            return invalid("Timing samples must be greater than zero");
        }

        Ok(())
    }
}
