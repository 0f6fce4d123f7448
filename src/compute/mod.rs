use crate::config::VehiclesConfig;
use crate::simulation::SimulationState;
use anyhow::Result;

#[cfg(feature = "parallel")]
pub mod parallel;

pub mod cpu;

pub use cpu::*;

#[cfg(feature = "parallel")]
pub use parallel::*;

/// Runs one tick: the sequential traffic step around the drive and wheel
/// batches. Backends differ only in how the batches are mapped.
pub trait SimulationBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<()>;
    fn get_name(&self) -> &'static str;
    fn is_parallel(&self) -> bool;
}

pub enum ComputeBackend {
    Cpu(CpuBackend),
    #[cfg(feature = "parallel")]
    Parallel(ParallelBackend),
}

impl ComputeBackend {
    pub fn new_cpu(vehicles_config: &VehiclesConfig, seed: Option<u64>) -> Self {
        ComputeBackend::Cpu(CpuBackend::new(vehicles_config, seed))
    }

    #[cfg(feature = "parallel")]
    pub fn new_parallel(vehicles_config: &VehiclesConfig, seed: Option<u64>) -> Result<Self> {
        Ok(ComputeBackend::Parallel(ParallelBackend::new(vehicles_config, seed)?))
    }

    #[cfg(not(feature = "parallel"))]
    pub fn new_parallel(_vehicles_config: &VehiclesConfig, _seed: Option<u64>) -> Result<Self> {
        anyhow::bail!("Parallel batch not compiled in. Enable 'parallel' feature.")
    }

    pub fn traffic_mut(&mut self) -> &mut crate::simulation::TrafficManager {
        match self {
            ComputeBackend::Cpu(backend) => backend.traffic_mut(),
            #[cfg(feature = "parallel")]
            ComputeBackend::Parallel(backend) => backend.traffic_mut(),
        }
    }
}

impl SimulationBackend for ComputeBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<()> {
        match self {
            ComputeBackend::Cpu(backend) => backend.update(state),
            #[cfg(feature = "parallel")]
            ComputeBackend::Parallel(backend) => backend.update(state),
        }
    }

    fn get_name(&self) -> &'static str {
        match self {
            ComputeBackend::Cpu(backend) => backend.get_name(),
            #[cfg(feature = "parallel")]
            ComputeBackend::Parallel(backend) => backend.get_name(),
        }
    }

    fn is_parallel(&self) -> bool {
        match self {
            ComputeBackend::Cpu(backend) => backend.is_parallel(),
            #[cfg(feature = "parallel")]
            ComputeBackend::Parallel(backend) => backend.is_parallel(),
        }
    }
}
