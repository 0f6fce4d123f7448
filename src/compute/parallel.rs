use rayon::prelude::*;

use crate::simulation::{DriveController, SimulationState, TrafficManager, WheelController};
use crate::config::VehiclesConfig;
use anyhow::Result;
use super::SimulationBackend;

/// Maps the drive and wheel batches over the rayon thread pool. Inputs are
/// collected sequentially, computed in parallel and applied sequentially.
pub struct ParallelBackend {
    traffic_manager: TrafficManager,
    pool: rayon::ThreadPool,
}

impl ParallelBackend {
    pub fn new(vehicles_config: &VehiclesConfig, seed: Option<u64>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new().build()?;
        log::info!("Parallel batch using {} worker threads", pool.current_num_threads());
        Ok(Self {
            traffic_manager: TrafficManager::new(vehicles_config, seed),
            pool,
        })
    }

    pub fn traffic_mut(&mut self) -> &mut TrafficManager {
        &mut self.traffic_manager
    }
}

impl SimulationBackend for ParallelBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<()> {
        let batch = self.traffic_manager.prepare(state);

        let outputs = {
            let ctx = self.traffic_manager.batch_context(state);
            self.pool.install(|| {
                batch
                    .inputs
                    .par_iter()
                    .map(|input| DriveController::compute(input, &ctx))
                    .collect::<Vec<_>>()
            })
        };
        self.traffic_manager.apply_drive_outputs(state, &batch, outputs);

        let wheels = self.traffic_manager.wheel_batch(state);
        let dt = state.dt;
        let wheel_outputs = self.pool.install(|| {
            wheels
                .inputs
                .par_iter()
                .map(|input| WheelController::compute(input, dt))
                .collect::<Vec<_>>()
        });
        self.traffic_manager.apply_wheel_outputs(state, &wheels, wheel_outputs);

        self.traffic_manager.finish(state);

        Ok(())
    }

    fn get_name(&self) -> &'static str {
        "Parallel"
    }

    fn is_parallel(&self) -> bool {
        true
    }
}
