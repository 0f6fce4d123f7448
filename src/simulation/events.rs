//! Notifications raised by the kernel for cosmetic, UI and pedestrian
//! collaborators. Nothing in the kernel depends on a subscriber existing.

use super::{DriveAction, IntersectionId, ObstacleSource, RoadSide, VehicleId, WaypointId};

#[derive(Debug, Clone, PartialEq)]
pub enum TrafficEvent {
    /// The vehicle's target has no usable successor.
    DestinationReached { vehicle: VehicleId, waypoint: WaypointId },
    DriveActionChanged {
        vehicle: VehicleId,
        action: DriveAction,
        side: RoadSide,
    },
    WaypointStopChanged { waypoint: WaypointId, stop: bool },
    GiveWayStateChanged { vehicle: VehicleId, waiting: bool },
    ObjectEnteredTrigger { vehicle: VehicleId, source: ObstacleSource },
    ObjectLeftTrigger { vehicle: VehicleId, source: ObstacleSource },
    /// A vehicle reached a waypoint flagged with `trigger_event`.
    WaypointEventReached {
        vehicle: VehicleId,
        waypoint: WaypointId,
        data: Option<String>,
    },
    ActiveIntersectionsChanged { active: Vec<IntersectionId> },
}

pub type EventHandler = Box<dyn FnMut(&TrafficEvent) + Send>;

/// Queues events raised during a tick until [`EventBus::dispatch`] or
/// [`EventBus::drain`] is called.
#[derive(Default)]
pub struct EventBus {
    queue: Vec<TrafficEvent>,
    subscribers: Vec<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&TrafficEvent) + Send + 'static,
    {
        self.subscribers.push(Box::new(handler));
    }

    pub fn publish(&mut self, event: TrafficEvent) {
        self.queue.push(event);
    }

    pub fn pending(&self) -> &[TrafficEvent] {
        &self.queue
    }

    /// Deliver queued events to every subscriber, then clear the queue.
    /// Returns how many events were delivered.
    pub fn dispatch(&mut self) -> usize {
        let events = std::mem::take(&mut self.queue);
        for event in &events {
            for subscriber in self.subscribers.iter_mut() {
                subscriber(event);
            }
        }
        events.len()
    }

    /// Take the queued events without notifying subscribers.
    pub fn drain(&mut self) -> Vec<TrafficEvent> {
        std::mem::take(&mut self.queue)
    }

    /// Move everything queued in `other` onto this bus.
    pub fn absorb(&mut self, other: &mut EventBus) {
        self.queue.append(&mut other.queue);
        self.subscribers.append(&mut other.subscribers);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queue", &self.queue)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
