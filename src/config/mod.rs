use anyhow::Result;

pub mod scene;
pub mod vehicles;

pub use scene::*;
pub use vehicles::*;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub scene: SceneConfig,
    pub vehicles: VehiclesConfig,
}

impl SimulationConfig {
    pub fn load_from_files(scene_path: &str, vehicles_path: &str) -> Result<Self> {
        let scene_content = std::fs::read_to_string(scene_path)?;
        let vehicles_content = std::fs::read_to_string(vehicles_path)?;

        Self::from_toml_strs(&scene_content, &vehicles_content)
    }

    pub fn from_toml_strs(scene: &str, vehicles: &str) -> Result<Self> {
        let scene: SceneConfig = toml::from_str(scene)?;
        let vehicles: VehiclesConfig = toml::from_str(vehicles)?;

        // Validate configurations
        scene.validate()?;
        vehicles.validate()?;

        Ok(SimulationConfig { scene, vehicles })
    }
}

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Typed validation failure, surfaced through `anyhow` by the loaders.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

pub(crate) fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(ConfigError(message.into()).into())
}
