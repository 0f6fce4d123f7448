use std::collections::VecDeque;

use super::{flat, signed_angle_deg, VehicleId, VehiclePool, WaypointGraph, WaypointId};

/// How far along the graph two targets are compared.
pub const MAX_ORDER_HOPS: usize = 8;

/// Decides which of two agents is ahead, for following and gap logic.
#[derive(Debug, Clone, Copy)]
pub struct VehiclePositioningSystem {
    pub max_hops: usize,
}

impl Default for VehiclePositioningSystem {
    fn default() -> Self {
        Self { max_hops: MAX_ORDER_HOPS }
    }
}

impl VehiclePositioningSystem {
    /// True when `a` is in front of `b`.
    pub fn is_in_front_of(&self, graph: &WaypointGraph, pool: &VehiclePool, a: VehicleId, b: VehicleId) -> bool {
        let (Some(va), Some(vb)) = (pool.vehicle(a), pool.vehicle(b)) else {
            log::error!("is_in_front_of: vehicle {} or {} out of range", a.0, b.0);
            return false;
        };
        let (pa, pb) = (va.state.position, vb.state.position);

        if let (Some(ta), Some(tb)) = (va.target, vb.target) {
            if ta == tb {
                let target = graph.position(ta);
                return flat(target - pa).norm_squared() < flat(target - pb).norm_squared();
            }
            let b_leads = self.reaches(graph, ta, tb);
            let a_leads = self.reaches(graph, tb, ta);
            if a_leads != b_leads {
                return a_leads;
            }
        }

        // Targets not comparable: the one heading away from the other leads.
        let angle_a = signed_angle_deg(&va.state.forward, &(pa - pb)).abs();
        let angle_b = signed_angle_deg(&vb.state.forward, &(pb - pa)).abs();
        angle_a < angle_b
    }

    /// Whether `to` is a successor of `from` within `max_hops`.
    pub fn reaches(&self, graph: &WaypointGraph, from: WaypointId, to: WaypointId) -> bool {
        let mut visited = vec![from];
        let mut queue = VecDeque::from([(from, 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth == self.max_hops {
                continue;
            }
            for &next in graph.neighbors(current) {
                if next == to {
                    return true;
                }
                if !visited.contains(&next) {
                    visited.push(next);
                    queue.push_back((next, depth + 1));
                }
            }
        }
        false
    }
}
