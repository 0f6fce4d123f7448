/// Control policy governing one agent for a tick.
///
/// Variants are declared in precedence order: when several actions apply
/// at once, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DriveAction {
    StopNow,
    NoPath,
    NoWaypoint,
    AvoidReverse,
    Reverse,
    AvoidForward,
    StopInDistance,
    GiveWay,
    StopInPoint,
    Follow,
    Overtake,
    #[default]
    Forward,
}

impl DriveAction {
    pub fn is_reverse(self) -> bool {
        matches!(self, DriveAction::Reverse | DriveAction::AvoidReverse)
    }
}

/// Side of the road an avoidance or overtake maneuver steers toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoadSide {
    #[default]
    Any,
    Left,
    Right,
}

/// Currently applicable actions of one agent, kept sorted by precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveActions {
    entries: Vec<(DriveAction, RoadSide)>,
}

impl ActiveActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding an action that is already present updates its side.
    pub fn add(&mut self, action: DriveAction, side: RoadSide) {
        if let Some(entry) = self.entries.iter_mut().find(|(a, _)| *a == action) {
            entry.1 = side;
            return;
        }
        let at = self.entries.partition_point(|(a, _)| *a < action);
        self.entries.insert(at, (action, side));
    }

    pub fn remove(&mut self, action: DriveAction) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(a, _)| *a != action);
        self.entries.len() != before
    }

    pub fn contains(&self, action: DriveAction) -> bool {
        self.entries.iter().any(|(a, _)| *a == action)
    }

    /// The action the drive batch executes; `Forward` when nothing else applies.
    pub fn current(&self) -> (DriveAction, RoadSide) {
        self.entries
            .first()
            .copied()
            .unwrap_or((DriveAction::Forward, RoadSide::Any))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DriveAction, RoadSide)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_precedence_action_wins() {
        let mut actions = ActiveActions::new();
        assert_eq!(actions.current().0, DriveAction::Forward);

        actions.add(DriveAction::GiveWay, RoadSide::Any);
        actions.add(DriveAction::StopInDistance, RoadSide::Any);
        actions.add(DriveAction::Follow, RoadSide::Any);
        assert_eq!(actions.current().0, DriveAction::StopInDistance);

        assert!(actions.remove(DriveAction::StopInDistance));
        assert_eq!(actions.current().0, DriveAction::GiveWay);
        assert!(!actions.remove(DriveAction::StopInDistance));
    }

    #[test]
    fn re_adding_updates_side() {
        let mut actions = ActiveActions::new();
        actions.add(DriveAction::AvoidForward, RoadSide::Left);
        actions.add(DriveAction::AvoidForward, RoadSide::Right);
        assert_eq!(actions.iter().count(), 1);
        assert_eq!(actions.current(), (DriveAction::AvoidForward, RoadSide::Right));
    }
}
