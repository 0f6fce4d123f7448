use anyhow::Result;
use log::info;
use std::time::Instant;

use waypoint_traffic::{
    config::SimulationConfig,
    simulation::{KinematicIntegrator, PerformanceTracker, Point, SimulationState},
    compute::{ComputeBackend, SimulationBackend},
};

const SIMULATED_SECONDS: f32 = 60.0;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();
    info!("Starting waypoint traffic kernel (console mode)");

    let mut args = std::env::args().skip(1);
    let scene_path = args.next().unwrap_or_else(|| "scene.toml".to_string());
    let vehicles_path = args.next().unwrap_or_else(|| "vehicles.toml".to_string());

    // Load configuration
    let config = SimulationConfig::load_from_files(&scene_path, &vehicles_path)?;
    info!(
        "Loaded configuration: scene '{}', {} waypoints, pool of {}, {} active max",
        config.scene.scene.name,
        config.scene.waypoints.len(),
        config.vehicles.simulation.pool_capacity,
        config.vehicles.simulation.max_active_vehicles
    );

    let seed = config.vehicles.random.seed;
    let mut simulation_state = SimulationState::from_config(&config, seed)?;

    // A single camera parked at the scene's centroid
    let centroid = config
        .scene
        .waypoints
        .iter()
        .fold([0.0f32; 3], |acc, wp| [acc[0] + wp.position[0], acc[1] + wp.position[1], acc[2] + wp.position[2]]);
    let n = config.scene.waypoints.len().max(1) as f32;
    simulation_state.set_viewpoints(vec![Point::new(centroid[0] / n, centroid[1] / n, centroid[2] / n)]);

    let mut compute_backend = match ComputeBackend::new_parallel(&config.vehicles, seed) {
        Ok(backend) => backend,
        Err(e) => {
            info!("Parallel batch not available ({e}); falling back to CPU backend");
            ComputeBackend::new_cpu(&config.vehicles, seed)
        }
    };
    info!("Compute backend: {}", compute_backend.get_name());

    let mut integrator = KinematicIntegrator;
    let mut performance_tracker = PerformanceTracker::new(config.vehicles.performance.timing_samples as usize);

    let ticks = (SIMULATED_SECONDS / simulation_state.dt) as u64;
    let ticks_per_report = (1.0 / simulation_state.dt).max(1.0) as u64;
    let start_time = Instant::now();

    info!("Simulating {:.0} seconds ({} ticks)...", SIMULATED_SECONDS, ticks);

    for tick in 0..ticks {
        performance_tracker.start_frame();
        performance_tracker.start_batch();

        compute_backend.update(&mut simulation_state)?;

        performance_tracker.end_batch();
        simulation_state.integrate(&mut integrator);
        performance_tracker.end_frame(&simulation_state);

        if tick % (ticks_per_report * 10) == 0 {
            info!(
                "t={:.1}s: {} vehicles active ({:.1} avg), {} idle, batch {:.0} inputs in {:.3}ms, {:.0} ticks/s",
                simulation_state.time,
                simulation_state.active_vehicles(),
                performance_tracker.average_active_vehicles(),
                simulation_state.pool.idle_ids().len(),
                performance_tracker.average_batch_size(),
                performance_tracker.average_batch_time().as_secs_f64() * 1000.0,
                performance_tracker.ticks_per_second()
            );
        }
    }

    // Final statistics
    let total_time = start_time.elapsed();
    info!("Simulation completed!");
    info!("Wall time: {:.2}s for {} ticks", total_time.as_secs_f64(), ticks);
    info!(
        "Final vehicle count: {} active of {} pooled, peak {}",
        simulation_state.active_vehicles(),
        simulation_state.pool.len(),
        performance_tracker.peak_active_vehicles()
    );
    info!(
        "Batch throughput: {:.0} inputs/s of backend time",
        performance_tracker.batch_inputs_per_second()
    );

    Ok(())
}
