use crate::simulation::{DriveController, SimulationState, TrafficManager, WheelController};
use crate::config::VehiclesConfig;
use anyhow::Result;
use super::SimulationBackend;

pub struct CpuBackend {
    traffic_manager: TrafficManager,
}

impl CpuBackend {
    pub fn new(vehicles_config: &VehiclesConfig, seed: Option<u64>) -> Self {
        Self {
            traffic_manager: TrafficManager::new(vehicles_config, seed),
        }
    }

    pub fn traffic_mut(&mut self) -> &mut TrafficManager {
        &mut self.traffic_manager
    }
}

impl SimulationBackend for CpuBackend {
    fn update(&mut self, state: &mut SimulationState) -> Result<()> {
        // Timers, targets and actions
        let batch = self.traffic_manager.prepare(state);

        let outputs = {
            let ctx = self.traffic_manager.batch_context(state);
            DriveController::run_batch(&batch.inputs, &ctx)
        };
        self.traffic_manager.apply_drive_outputs(state, &batch, outputs);

        let wheels = self.traffic_manager.wheel_batch(state);
        let wheel_outputs = WheelController::run_batch(&wheels.inputs, state.dt);
        self.traffic_manager.apply_wheel_outputs(state, &wheels, wheel_outputs);

        // Spawning, despawning and event delivery
        self.traffic_manager.finish(state);

        Ok(())
    }

    fn get_name(&self) -> &'static str {
        "CPU"
    }

    fn is_parallel(&self) -> bool {
        false
    }
}
