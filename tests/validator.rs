use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use waypoint_traffic::simulation::{
    ClearLineOfSight, Footprint, FootprintIndex, LineOfSight, Point, PositionValidator, Vec3,
};

fn validator(clearance: f32) -> PositionValidator {
    PositionValidator {
        safe_spawn_radius: 30.0,
        clearance,
    }
}

struct Wall;

impl LineOfSight for Wall {
    fn is_visible(&self, _from: &Point, _to: &Point) -> bool {
        false
    }
}

#[test]
fn test_candidate_inside_an_occupied_footprint_is_rejected() {
    let mut rng = StdRng::seed_from_u64(0xF00D);
    let validator = validator(0.0);

    for _ in 0..500 {
        let heading = rng.gen_range(0.0..std::f32::consts::TAU);
        let occupied = Footprint::new(
            Point::new(rng.gen_range(-100.0..100.0), 0.0, rng.gen_range(-100.0..100.0)),
            Vec3::new(heading.sin(), 0.0, heading.cos()),
            rng.gen_range(3.0..14.0),
            rng.gen_range(1.5..2.6),
        );
        let inside = occupied.center
            + occupied.forward * occupied.half_length * rng.gen_range(-0.95..0.95)
            + occupied.right() * occupied.half_width * rng.gen_range(-0.95..0.95);
        let other_heading = rng.gen_range(0.0..std::f32::consts::TAU);
        let candidate = Footprint::new(inside, Vec3::new(other_heading.sin(), 0.0, other_heading.cos()), 4.5, 1.8);

        let far = Footprint::new(Point::new(500.0, 0.0, 500.0), Vec3::z(), 4.5, 1.8);
        let index = FootprintIndex::new(vec![far, occupied]);
        assert!(!validator.is_position_free(&candidate, &index));
    }
}

#[test]
fn test_far_candidate_is_free() {
    let index = FootprintIndex::new(vec![Footprint::new(Point::origin(), Vec3::z(), 4.5, 1.8)]);
    let candidate = Footprint::new(Point::new(0.0, 0.0, 20.0), Vec3::z(), 4.5, 1.8);
    assert!(validator(0.5).is_position_free(&candidate, &index));
    assert!(validator(0.5).is_position_free(&candidate, &FootprintIndex::new(Vec::new())));
}

#[test]
fn test_diagonal_bodies_with_overlapping_bounds_can_be_free() {
    // Long body at 45 degrees; the small box sits in its bounding box but beside it.
    let diagonal = Footprint::new(Point::origin(), Vec3::new(1.0, 0.0, 1.0), 10.0, 1.0);
    let small = Footprint::new(Point::new(3.0, 0.0, -3.0), Vec3::z(), 1.0, 1.0);

    let lo = diagonal.aabb().lower();
    assert!(lo[0] < 2.5 && lo[1] < -2.5, "bounds overlap");
    assert!(!diagonal.overlaps(&small));
    assert!(validator(0.0).is_position_free(&small, &FootprintIndex::new(vec![diagonal])));

    let grazing = Footprint::new(Point::new(0.5, 0.0, -0.5), Vec3::z(), 1.0, 1.0);
    assert!(diagonal.overlaps(&grazing));
}

#[test]
fn test_clearance_widens_the_check() {
    let parked = Footprint::new(Point::origin(), Vec3::z(), 4.5, 1.8);
    let alongside = Footprint::new(Point::new(2.4, 0.0, 0.0), Vec3::z(), 4.5, 1.8);
    let index = FootprintIndex::new(vec![parked]);

    assert!(validator(0.5).is_position_free(&alongside, &index));
    assert!(!validator(1.0).is_position_free(&alongside, &index));
}

#[test]
fn test_out_of_sight_needs_distance_or_cover() {
    let validator = validator(0.5);
    let viewpoints = [Point::origin()];

    let near = Point::new(0.0, 0.0, 20.0);
    let far = Point::new(0.0, 0.0, 40.0);
    assert!(!validator.is_out_of_sight(&near, &viewpoints, &ClearLineOfSight));
    assert!(validator.is_out_of_sight(&near, &viewpoints, &Wall));
    assert!(validator.is_out_of_sight(&far, &viewpoints, &ClearLineOfSight));

    // Every viewpoint must agree
    let two = [Point::origin(), Point::new(0.0, 0.0, 50.0)];
    assert!(!validator.is_out_of_sight(&far, &two, &ClearLineOfSight));
    assert!(validator.is_out_of_sight(&far, &[], &ClearLineOfSight));
}

#[test]
fn test_trailer_blocks_activation() {
    let validator = validator(0.5);
    let body = Footprint::new(Point::new(0.0, 0.0, 100.0), Vec3::z(), 6.0, 2.5);
    let trailer = Footprint::new(Point::new(0.0, 0.0, 91.0), Vec3::z(), 10.0, 2.5);
    let parked = FootprintIndex::new(vec![Footprint::new(Point::new(0.0, 0.0, 84.0), Vec3::z(), 4.5, 1.8)]);
    let viewpoints = [Point::origin()];

    assert!(validator.can_activate(&body, None, &parked, &viewpoints, &ClearLineOfSight));
    assert!(!validator.can_activate(&body, Some(&trailer), &parked, &viewpoints, &ClearLineOfSight));

    // Visible from a viewpoint close by
    let close = [Point::new(0.0, 0.0, 110.0)];
    assert!(!validator.can_activate(&body, None, &parked, &close, &ClearLineOfSight));
}
