//! Spawn/despawn pose checks: footprint overlap and camera visibility.

use rstar::{RTree, RTreeObject, AABB};

use super::{flat, Point, Vec3};
use crate::config::SpawnSettings;

/// Oriented rectangle of a body on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub center: Point,
    /// Unit heading on the ground plane.
    pub forward: Vec3,
    pub half_length: f32,
    pub half_width: f32,
}

impl Footprint {
    pub fn new(center: Point, forward: Vec3, length: f32, width: f32) -> Self {
        Self {
            center,
            forward: flat(forward).try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z),
            half_length: length * 0.5,
            half_width: width * 0.5,
        }
    }

    pub fn right(&self) -> Vec3 {
        Vec3::new(self.forward.z, 0.0, -self.forward.x)
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            half_length: self.half_length + margin,
            half_width: self.half_width + margin,
            ..*self
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        let f = self.forward * self.half_length;
        let r = self.right() * self.half_width;
        [
            self.center + f + r,
            self.center + f - r,
            self.center - f - r,
            self.center - f + r,
        ]
    }

    pub fn aabb(&self) -> AABB<[f32; 2]> {
        let corners = self.corners();
        let (mut lo, mut hi) = ([f32::MAX; 2], [f32::MIN; 2]);
        for c in &corners {
            lo = [lo[0].min(c.x), lo[1].min(c.z)];
            hi = [hi[0].max(c.x), hi[1].max(c.z)];
        }
        AABB::from_corners(lo, hi)
    }

    fn radius_along(&self, axis: &Vec3) -> f32 {
        self.half_length * self.forward.dot(axis).abs() + self.half_width * self.right().dot(axis).abs()
    }

    /// Separating-axis test on the ground plane. Touching counts as overlap.
    pub fn overlaps(&self, other: &Footprint) -> bool {
        let offset = flat(other.center - self.center);
        let axes = [self.forward, self.right(), other.forward, other.right()];
        axes.iter().all(|axis| {
            offset.dot(axis).abs() <= self.radius_along(axis) + other.radius_along(axis)
        })
    }
}

#[derive(Debug, Clone)]
struct FootprintEntry {
    envelope: AABB<[f32; 2]>,
    index: usize,
}

impl RTreeObject for FootprintEntry {
    type Envelope = AABB<[f32; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a set of footprints for repeated overlap queries.
#[derive(Debug, Clone)]
pub struct FootprintIndex {
    footprints: Vec<Footprint>,
    tree: RTree<FootprintEntry>,
}

impl FootprintIndex {
    pub fn new(footprints: Vec<Footprint>) -> Self {
        let entries = footprints
            .iter()
            .enumerate()
            .map(|(index, footprint)| FootprintEntry {
                envelope: footprint.aabb(),
                index,
            })
            .collect();
        Self {
            footprints,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn overlaps_any(&self, candidate: &Footprint) -> bool {
        self.tree
            .locate_in_envelope_intersecting(&candidate.aabb())
            .any(|entry| self.footprints[entry.index].overlaps(candidate))
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

/// Host-side visibility query (raycast against level geometry).
pub trait LineOfSight: Send {
    fn is_visible(&self, from: &Point, to: &Point) -> bool;
}

/// No occluders: everything within range is visible.
pub struct ClearLineOfSight;

impl LineOfSight for ClearLineOfSight {
    fn is_visible(&self, _from: &Point, _to: &Point) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionValidator {
    pub safe_spawn_radius: f32,
    pub clearance: f32,
}

impl PositionValidator {
    pub fn new(settings: &SpawnSettings) -> Self {
        Self {
            safe_spawn_radius: settings.safe_spawn_radius,
            clearance: settings.clearance,
        }
    }

    pub fn is_position_free(&self, candidate: &Footprint, others: &FootprintIndex) -> bool {
        !others.overlaps_any(&candidate.expanded(self.clearance))
    }

    /// Beyond the safe radius of every viewpoint, or inside it but hidden.
    pub fn is_out_of_sight(&self, position: &Point, viewpoints: &[Point], line_of_sight: &dyn LineOfSight) -> bool {
        let radius_sq = self.safe_spawn_radius * self.safe_spawn_radius;
        viewpoints.iter().all(|viewpoint| {
            (viewpoint - position).norm_squared() > radius_sq || !line_of_sight.is_visible(viewpoint, position)
        })
    }

    /// Both checks an idle vehicle must pass before it becomes active.
    pub fn can_activate(
        &self,
        body: &Footprint,
        trailer: Option<&Footprint>,
        others: &FootprintIndex,
        viewpoints: &[Point],
        line_of_sight: &dyn LineOfSight,
    ) -> bool {
        self.is_position_free(body, others)
            && trailer.map_or(true, |t| self.is_position_free(t, others))
            && self.is_out_of_sight(&body.center, viewpoints, line_of_sight)
    }
}
