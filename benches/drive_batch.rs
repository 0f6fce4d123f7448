use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use waypoint_traffic::{
    compute::{ComputeBackend, SimulationBackend},
    config::{DriveTunables, SimulationConfig},
    simulation::{
        BatchContext, DriveAction, DriveController, DriveInput, Gear, KinematicIntegrator, ObstacleInput, Point,
        RoadSide, SimulationState, Vec3,
    },
};

fn synthetic_inputs(count: usize) -> Vec<DriveInput> {
    let mut rng = StdRng::seed_from_u64(42);
    let actions = [
        DriveAction::Forward,
        DriveAction::Follow,
        DriveAction::StopInDistance,
        DriveAction::StopInPoint,
    ];
    (0..count)
        .map(|_| {
            let position = Point::new(rng.gen_range(-200.0..200.0), 0.0, rng.gen_range(-200.0..200.0));
            let heading: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
            let forward = Vec3::new(heading.sin(), 0.0, heading.cos());
            DriveInput {
                action: actions[rng.gen_range(0..actions.len())],
                side: RoadSide::Any,
                position,
                forward,
                velocity: forward * rng.gen_range(0.0..15.0),
                target: position + forward * rng.gen_range(2.0..40.0),
                next_target: Some(position + Vec3::new(rng.gen_range(-30.0..30.0), 0.0, rng.gen_range(-30.0..30.0))),
                target_speed: 13.89,
                obstacle: Some(ObstacleInput {
                    position: position + forward * rng.gen_range(5.0..50.0),
                    speed: Some(rng.gen_range(0.0..12.0)),
                }),
                steer_angle: 0.0,
                gear: Gear::Drive,
                tunables: DriveTunables::default(),
                length: 4.5,
                mass: 1300.0,
                trailer: None,
            }
        })
        .collect()
}

fn benchmark_drive_batch(c: &mut Criterion) {
    let inputs = synthetic_inputs(1000);
    let viewpoints = [Point::origin()];
    let ctx = BatchContext {
        dt: 0.02,
        viewpoints: &viewpoints,
        remove_distance_sq: 150.0 * 150.0,
    };

    c.bench_function("drive_batch_1000", |b| {
        b.iter(|| DriveController::run_batch(black_box(&inputs), &ctx))
    });
}

fn warmed_up(backend: &mut ComputeBackend, config: &SimulationConfig) -> SimulationState {
    let mut state = SimulationState::from_config(config, Some(42)).expect("Failed to build simulation state");
    state.set_viewpoints(vec![Point::origin()]);
    let mut integrator = KinematicIntegrator;

    // Pre-populate with some vehicles for realistic benchmarking
    for _ in 0..500 {
        backend.update(&mut state).unwrap();
        state.integrate(&mut integrator);
    }
    state
}

fn benchmark_cpu_tick(c: &mut Criterion) {
    let config = SimulationConfig::load_from_files("scene.toml", "vehicles.toml")
        .expect("Failed to load configuration");
    let mut backend = ComputeBackend::new_cpu(&config.vehicles, Some(42));
    let mut state = warmed_up(&mut backend, &config);
    let mut integrator = KinematicIntegrator;

    c.bench_function("cpu_tick", |b| {
        b.iter(|| {
            backend.update(black_box(&mut state)).unwrap();
            state.integrate(&mut integrator);
        })
    });
}

fn benchmark_parallel_tick(c: &mut Criterion) {
    let config = SimulationConfig::load_from_files("scene.toml", "vehicles.toml")
        .expect("Failed to load configuration");

    if let Ok(mut backend) = ComputeBackend::new_parallel(&config.vehicles, Some(42)) {
        let mut state = warmed_up(&mut backend, &config);
        let mut integrator = KinematicIntegrator;

        c.bench_function("parallel_tick", |b| {
            b.iter(|| {
                backend.update(black_box(&mut state)).unwrap();
                state.integrate(&mut integrator);
            })
        });
    } else {
        println!("Parallel batch not available, skipping parallel benchmark");
    }
}

criterion_group!(benches, benchmark_drive_batch, benchmark_cpu_tick, benchmark_parallel_tick);
criterion_main!(benches);
