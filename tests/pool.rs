mod common;

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use waypoint_traffic::{
    config::VehicleType,
    simulation::{DriveAction, VehicleId, VehiclePool, WaypointId},
};

use common::entry;

fn count_of(pool: &VehiclePool, catalog_index: usize) -> usize {
    pool.vehicles().iter().filter(|v| v.catalog_index == catalog_index).count()
}

#[test]
fn test_capacity_split_by_weight() {
    let catalog = vec![entry("sedan", VehicleType::Car, 3), entry("van", VehicleType::Van, 1)];
    let pool = VehiclePool::build(&catalog, 10);

    assert_eq!(pool.len(), 10);
    assert_eq!(count_of(&pool, 0), 7);
    assert_eq!(count_of(&pool, 1), 3);
}

#[test]
fn test_leftovers_go_to_the_first_largest_remainders() {
    let catalog = vec![
        entry("a", VehicleType::Car, 1),
        entry("b", VehicleType::Car, 1),
        entry("c", VehicleType::Car, 1),
    ];
    let pool = VehiclePool::build(&catalog, 5);

    assert_eq!(pool.len(), 5);
    assert_eq!((count_of(&pool, 0), count_of(&pool, 1), count_of(&pool, 2)), (2, 2, 1));
}

#[test]
fn test_small_capacity_still_builds_one_of_each() {
    let catalog = vec![
        entry("a", VehicleType::Car, 5),
        entry("b", VehicleType::Van, 1),
        entry("c", VehicleType::Bus, 1),
    ];
    let pool = VehiclePool::build(&catalog, 2);

    assert_eq!(pool.len(), 3);
    for index in 0..3 {
        assert_eq!(count_of(&pool, index), 1);
    }
}

#[test]
fn test_zero_weights_split_evenly_and_hidden_entries_are_skipped() {
    let mut hidden = entry("fire engine", VehicleType::Emergency, 5);
    hidden.dont_instantiate = true;
    let catalog = vec![entry("a", VehicleType::Car, 0), hidden, entry("b", VehicleType::Van, 0)];
    let pool = VehiclePool::build(&catalog, 6);

    assert_eq!(pool.len(), 6);
    assert_eq!(count_of(&pool, 0), 3);
    assert_eq!(count_of(&pool, 1), 0);
    assert_eq!(count_of(&pool, 2), 3);
}

#[test]
fn test_empty_catalog_builds_empty_pool() {
    let mut hidden = entry("hidden", VehicleType::Car, 1);
    hidden.dont_instantiate = true;
    let pool = VehiclePool::build(&[hidden], 10);
    assert!(pool.is_empty());
    assert!(pool.idle_ids().is_empty());
}

fn assert_partition(pool: &VehiclePool) {
    let idle: HashSet<VehicleId> = pool.idle_ids().iter().copied().collect();
    let active: HashSet<VehicleId> = pool.active_ids().iter().copied().collect();
    let excluded: HashSet<VehicleId> = pool.excluded_ids().collect();

    assert_eq!(idle.len(), pool.idle_ids().len(), "duplicate idle id");
    assert_eq!(active.len(), pool.active_ids().len(), "duplicate active id");
    assert!(idle.is_disjoint(&active));
    assert!(idle.is_disjoint(&excluded));
    assert!(active.is_disjoint(&excluded));
    assert_eq!(idle.len() + active.len() + excluded.len(), pool.len());
}

#[test]
fn test_random_operations_keep_the_partition() {
    let catalog = vec![
        entry("sedan", VehicleType::Car, 4),
        entry("van", VehicleType::Van, 2),
        entry("bus", VehicleType::Bus, 1),
    ];
    let mut pool = VehiclePool::build(&catalog, 16);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..2000 {
        let id = VehicleId(rng.gen_range(0..pool.len() + 2));
        match rng.gen_range(0..5) {
            0 => {
                pool.get_and_remove_vehicle(id);
            }
            1 => {
                pool.add_vehicle(id);
            }
            2 => {
                if let Some(idle) = pool.idle_vehicle_index(None, &mut rng) {
                    assert!(pool.get_and_remove_vehicle(idle));
                }
            }
            3 => {
                pool.exclude_vehicle(id);
            }
            _ => {
                pool.include_vehicle(id);
            }
        }
        assert_partition(&pool);
    }
}

#[test]
fn test_typed_lookup_and_exhaustion() {
    let catalog = vec![entry("sedan", VehicleType::Car, 1), entry("bus", VehicleType::Bus, 1)];
    let mut pool = VehiclePool::build(&catalog, 4);
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..2 {
        let bus = pool
            .idle_vehicle_index(Some(VehicleType::Bus), &mut rng)
            .expect("an idle bus");
        assert_eq!(pool.vehicle(bus).map(|v| v.vehicle_type), Some(VehicleType::Bus));
        assert!(pool.get_and_remove_vehicle(bus));
    }
    assert_eq!(pool.idle_vehicle_index(Some(VehicleType::Bus), &mut rng), None);
    assert_eq!(pool.idle_vehicle_index(Some(VehicleType::Truck), &mut rng), None);
    assert!(pool.idle_vehicle_index(None, &mut rng).is_some());
}

#[test]
fn test_invalid_transitions_are_rejected() {
    let mut pool = VehiclePool::build(&[entry("sedan", VehicleType::Car, 1)], 2);
    let id = VehicleId(0);

    assert!(!pool.add_vehicle(id), "not active yet");
    assert!(pool.get_and_remove_vehicle(id));
    assert!(!pool.get_and_remove_vehicle(id), "already active");
    assert!(!pool.get_and_remove_vehicle(VehicleId(42)));
    assert!(!pool.exclude_vehicle(VehicleId(42)));
    assert!(!pool.include_vehicle(VehicleId(1)), "never excluded");
}

#[test]
fn test_returning_a_vehicle_clears_its_trip() {
    let mut pool = VehiclePool::build(&[entry("sedan", VehicleType::Car, 1)], 1);
    let id = VehicleId(0);
    assert!(pool.get_and_remove_vehicle(id));

    if let Some(vehicle) = pool.vehicle_mut(id) {
        vehicle.target = Some(WaypointId(3));
        vehicle.action = DriveAction::StopNow;
        vehicle.state.position.z = 40.0;
    }
    assert!(pool.add_vehicle(id));

    let vehicle = pool.vehicle(id).expect("vehicle exists");
    assert_eq!(vehicle.target, None);
    assert_eq!(vehicle.action, DriveAction::Forward);
    assert_eq!(vehicle.state.position.z, 0.0);
    assert_eq!(pool.idle_ids(), &[id]);
}

#[test]
fn test_excluded_vehicle_comes_back_idle() {
    let mut pool = VehiclePool::build(&[entry("sedan", VehicleType::Car, 1)], 3);
    let id = VehicleId(1);
    assert!(pool.get_and_remove_vehicle(id));
    assert!(pool.exclude_vehicle(id));

    assert!(!pool.is_active(id));
    assert_eq!(pool.excluded_ids().collect::<Vec<_>>(), vec![id]);

    assert!(pool.include_vehicle(id));
    assert!(pool.idle_ids().contains(&id));
    assert_eq!(pool.excluded_ids().count(), 0);
}
