//! Planner event types and the EventBus
//!
//! Every successful mutation in the planner publishes a [`PlannerEvent`] so a
//! presentation layer can push live updates to every family member's device.

use crate::ids::{ActivityId, CandidateId, MemberId, TripId};
use crate::models::{Coordinates, ScheduleSlot, Tally};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Planner event types
///
/// Serialized with a `type` tag so they can be forwarded as-is over SSE or
/// WebSocket by the presentation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlannerEvent {
    /// Activity placed into (or moved within) a schedule bucket
    ActivityPlaced {
        trip_id: TripId,
        activity_id: ActivityId,
        slot: ScheduleSlot,
        position: u32,
        /// Previous bucket, if the activity was already scheduled
        previous: Option<ScheduleSlot>,
        timestamp: DateTime<Utc>,
    },

    /// Activity removed from the schedule
    ActivityUnscheduled {
        trip_id: TripId,
        activity_id: ActivityId,
        previous: ScheduleSlot,
        timestamp: DateTime<Utc>,
    },

    /// More than one must-do activity shares a slot (advisory only)
    SlotConflictDetected {
        trip_id: TripId,
        slot: ScheduleSlot,
        must_do: Vec<ActivityId>,
        timestamp: DateTime<Utc>,
    },

    /// A member cast, replaced or withdrew a vote
    VoteCast {
        trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
        tally: Tally,
        timestamp: DateTime<Utc>,
    },

    /// Candidate frozen and turned into a scheduled activity
    CandidatePromoted {
        trip_id: TripId,
        candidate_id: CandidateId,
        activity_id: ActivityId,
        slot: ScheduleSlot,
        timestamp: DateTime<Utc>,
    },

    /// Candidate explicitly removed from consideration
    CandidateArchived {
        trip_id: TripId,
        candidate_id: CandidateId,
        timestamp: DateTime<Utc>,
    },

    /// Background geocoding filled in an activity's coordinates
    CoordinatesResolved {
        trip_id: TripId,
        activity_id: ActivityId,
        coordinates: Coordinates,
        timestamp: DateTime<Utc>,
    },
}

impl PlannerEvent {
    /// Trip the event belongs to
    pub fn trip_id(&self) -> TripId {
        match self {
            PlannerEvent::ActivityPlaced { trip_id, .. }
            | PlannerEvent::ActivityUnscheduled { trip_id, .. }
            | PlannerEvent::SlotConflictDetected { trip_id, .. }
            | PlannerEvent::VoteCast { trip_id, .. }
            | PlannerEvent::CandidatePromoted { trip_id, .. }
            | PlannerEvent::CandidateArchived { trip_id, .. }
            | PlannerEvent::CoordinatesResolved { trip_id, .. } => *trip_id,
        }
    }
}

/// Broadcast bus for planner events
///
/// Backed by `tokio::sync::broadcast`:
/// - Publishing never blocks; slow subscribers lag and lose old events
/// - Any number of subscribers, each seeing events emitted after subscribing
/// - No subscribers is a normal state, not an error
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlannerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning how many subscribers received it
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlannerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlannerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlannerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Planner event dropped: no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSlot;
    use chrono::NaiveDate;

    fn archived(trip_id: TripId) -> PlannerEvent {
        PlannerEvent::CandidateArchived {
            trip_id,
            candidate_id: CandidateId::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_err_but_lossy_is_silent() {
        let bus = EventBus::new(8);
        assert!(bus.emit(archived(TripId::new())).is_err());
        bus.emit_lossy(archived(TripId::new()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let trip_id = TripId::new();

        assert_eq!(bus.emit(archived(trip_id)).unwrap(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.trip_id(), trip_id);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlannerEvent::ActivityUnscheduled {
            trip_id: TripId::new(),
            activity_id: ActivityId::new(),
            previous: ScheduleSlot::new(
                NaiveDate::from_ymd_opt(2025, 7, 27).unwrap(),
                TimeSlot::Evening,
            ),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ActivityUnscheduled");
        assert_eq!(json["previous"]["time_slot"], "evening");
    }
}
