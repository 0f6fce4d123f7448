use serde::{Deserialize, Serialize};
use anyhow::Result;
use super::{invalid, Validate, VehicleType};

/// The persisted scene: a flat waypoint array plus per-type intersection
/// records. Waypoints reference each other only by array index.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SceneConfig {
    pub scene: SceneInfo,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub waypoints: Vec<WaypointRecord>,
    #[serde(default)]
    pub priority_intersections: Vec<PriorityIntersectionRecord>,
    #[serde(default)]
    pub traffic_light_intersections: Vec<TrafficLightIntersectionRecord>,
    #[serde(default)]
    pub priority_crossings: Vec<PriorityCrossingRecord>,
    #[serde(default)]
    pub traffic_light_crossings: Vec<TrafficLightCrossingRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SceneInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GraphSettings {
    /// Reject graphs whose neighbor/prev lists disagree instead of trusting the data.
    #[serde(default = "default_true")]
    pub validate_symmetry: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self { validate_symmetry: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WaypointRecord {
    pub name: String,
    pub position: [f32; 3],
    #[serde(default)]
    pub neighbors: Vec<usize>,
    #[serde(default)]
    pub prev: Vec<usize>,
    #[serde(default)]
    pub other_lanes: Vec<usize>,
    pub max_speed: f32, // m/s
    #[serde(default = "default_lane_width")]
    pub lane_width: f32,
    #[serde(default)]
    pub give_way: bool,
    #[serde(default)]
    pub complex_give_way: bool,
    #[serde(default)]
    pub zipper_give_way: bool,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub trigger_event: bool,
    #[serde(default)]
    pub temporarily_disabled: bool,
    // Empty means every vehicle type may use the waypoint
    #[serde(default)]
    pub allowed_vehicles: Vec<VehicleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<String>,
    #[serde(default)]
    pub give_way_list: Vec<usize>,
}

/// Opaque reference to a light object in the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LightHandle(pub u32);

/// Stop waypoints of one incoming road.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoadRecord {
    pub waypoints: Vec<usize>,
    #[serde(default = "default_green_time")]
    pub green_time: f32,
    #[serde(default)]
    pub lights: Vec<LightHandle>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PriorityIntersectionRecord {
    pub name: String,
    #[serde(default)]
    pub roads: Vec<RoadRecord>,
    #[serde(default)]
    pub exit_waypoints: Vec<usize>,
    #[serde(default)]
    pub pedestrian_waypoints: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrafficLightIntersectionRecord {
    pub name: String,
    #[serde(default)]
    pub roads: Vec<RoadRecord>,
    #[serde(default)]
    pub exit_waypoints: Vec<usize>,
    #[serde(default = "default_yellow_time")]
    pub yellow_time: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedestrian_phase: Option<RoadRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PriorityCrossingRecord {
    pub name: String,
    pub road: RoadRecord,
    #[serde(default)]
    pub pedestrian_waypoints: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrafficLightCrossingRecord {
    pub name: String,
    pub road: RoadRecord,
    #[serde(default = "default_green_time")]
    pub green_time: f32,
    #[serde(default = "default_yellow_time")]
    pub yellow_time: f32,
    #[serde(default = "default_red_time")]
    pub red_time: f32,
    #[serde(default)]
    pub pedestrian_waypoints: Vec<usize>,
    #[serde(default)]
    pub pedestrian_lights: Vec<LightHandle>,
}

fn default_true() -> bool {
    true
}

fn default_lane_width() -> f32 {
    4.0
}

fn default_green_time() -> f32 {
    10.0
}

fn default_yellow_time() -> f32 {
    3.0
}

fn default_red_time() -> f32 {
    10.0
}

impl SceneConfig {
    fn check_waypoints(&self, owner: &str, indices: &[usize]) -> Result<()> {
        for &index in indices {
            if index >= self.waypoints.len() {
                return invalid(format!(
                    "{} references waypoint {} but the scene has {} waypoints",
                    owner,
                    index,
                    self.waypoints.len()
                ));
            }
        }
        Ok(())
    }

    fn check_road(&self, owner: &str, road: &RoadRecord) -> Result<()> {
        self.check_waypoints(owner, &road.waypoints)?;
        if road.green_time <= 0.0 {
            return invalid(format!("{} has a non-positive green time", owner));
        }
        Ok(())
    }
}

impl Validate for SceneConfig {
    fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            return invalid("Scene must contain at least one waypoint");
        }

        for (i, waypoint) in self.waypoints.iter().enumerate() {
            if waypoint.max_speed <= 0.0 {
                return invalid(format!("Waypoint {} ({}) must have a positive max speed", i, waypoint.name));
            }
            if waypoint.lane_width <= 0.0 {
                return invalid(format!("Waypoint {} ({}) must have a positive lane width", i, waypoint.name));
            }
            if waypoint.position.iter().any(|c| !c.is_finite()) {
                return invalid(format!("Waypoint {} ({}) has a non-finite position", i, waypoint.name));
            }
        }

        // Zero-road intersections are tolerated here; they become inert at runtime.
        for record in &self.priority_intersections {
            for road in &record.roads {
                self.check_road(&record.name, road)?;
            }
            self.check_waypoints(&record.name, &record.exit_waypoints)?;
        }

        for record in &self.traffic_light_intersections {
            for road in &record.roads {
                self.check_road(&record.name, road)?;
            }
            self.check_waypoints(&record.name, &record.exit_waypoints)?;
            if record.yellow_time < 0.0 {
                return invalid(format!("{} has a negative yellow time", record.name));
            }
            if let Some(phase) = &record.pedestrian_phase {
                if phase.green_time <= 0.0 {
                    return invalid(format!("{} has a non-positive pedestrian green time", record.name));
                }
            }
        }

        for record in &self.priority_crossings {
            self.check_waypoints(&record.name, &record.road.waypoints)?;
        }

        for record in &self.traffic_light_crossings {
            self.check_waypoints(&record.name, &record.road.waypoints)?;
            if record.green_time <= 0.0 || record.red_time <= 0.0 || record.yellow_time < 0.0 {
                return invalid(format!("{} must have positive green/red and non-negative yellow times", record.name));
            }
        }

        Ok(())
    }
}
