//! Scheduling Engine
//!
//! Owns a trip's activities and their slot index. Every mutation keeps the
//! activity records and the index in agreement: an activity's
//! `schedule.position` always equals its index in the bucket.

use super::index::ScheduleIndex;
use chrono::NaiveDate;
use famtrip_common::models::{
    Activity, Coordinates, Priority, ScheduleSlot, SlotAssignment, TimeSlot,
};
use famtrip_common::{ActivityId, TripId};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Unknown activity: {0}")]
    UnknownActivity(ActivityId),

    #[error("Activity {activity_id} belongs to trip {found}, not {expected}")]
    TripMismatch {
        activity_id: ActivityId,
        expected: TripId,
        found: TripId,
    },
}

/// Outcome of a placement or unschedule
#[derive(Debug, Clone)]
pub struct PlacementChange {
    /// The activity after the change
    pub activity: Activity,
    /// Bucket it occupied before, if any
    pub previous: Option<ScheduleSlot>,
    /// Every activity whose slot record changed, the target included
    pub changed: Vec<Activity>,
}

/// More than one must-do activity sharing a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotConflict {
    pub slot: ScheduleSlot,
    pub must_do: Vec<ActivityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub morning: Vec<Activity>,
    pub afternoon: Vec<Activity>,
    pub evening: Vec<Activity>,
    pub total_cost: f64,
}

impl DailySummary {
    pub fn bucket(&self, time_slot: TimeSlot) -> &[Activity] {
        match time_slot {
            TimeSlot::Morning => &self.morning,
            TimeSlot::Afternoon => &self.afternoon,
            TimeSlot::Evening => &self.evening,
        }
    }

    pub fn activity_count(&self) -> usize {
        self.morning.len() + self.afternoon.len() + self.evening.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripOverview {
    pub days: Vec<DailySummary>,
    pub total_cost: f64,
}

#[derive(Debug, Clone)]
pub struct SchedulingEngine {
    trip_id: TripId,
    activities: HashMap<ActivityId, Activity>,
    index: ScheduleIndex,
}

impl SchedulingEngine {
    pub fn new(trip_id: TripId) -> Self {
        Self {
            trip_id,
            activities: HashMap::new(),
            index: ScheduleIndex::new(),
        }
    }

    /// Build from the store's activity records
    ///
    /// Records for other trips are skipped. Stored positions are normalized
    /// in memory so each bucket is numbered 0..n.
    pub fn from_activities(trip_id: TripId, activities: Vec<Activity>) -> Self {
        let activities: HashMap<ActivityId, Activity> = activities
            .into_iter()
            .filter(|a| {
                if a.trip_id != trip_id {
                    tracing::warn!(
                        trip_id = %trip_id,
                        activity_id = %a.id,
                        "Skipping activity stored under another trip"
                    );
                }
                a.trip_id == trip_id
            })
            .map(|a| (a.id, a))
            .collect();

        let index = ScheduleIndex::build(activities.values());
        let mut engine = Self {
            trip_id,
            activities,
            index,
        };
        let slots: Vec<ScheduleSlot> = engine.index.buckets().map(|(slot, _)| *slot).collect();
        let renumbered = engine.renumber(slots);
        if !renumbered.is_empty() {
            tracing::debug!(
                trip_id = %trip_id,
                count = renumbered.len(),
                "Normalized stored slot positions"
            );
        }
        engine
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn get(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.get(&id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    pub fn index(&self) -> &ScheduleIndex {
        &self.index
    }

    /// Add an activity created elsewhere, or refresh a known one
    ///
    /// For a known ID only descriptive fields are taken; the schedule stays
    /// under this engine's control. A new activity that arrives already
    /// scheduled is inserted at its stored position. Returns the activities
    /// whose slot record changed.
    pub fn track(&mut self, activity: Activity) -> Result<Vec<Activity>, ScheduleError> {
        if activity.trip_id != self.trip_id {
            return Err(ScheduleError::TripMismatch {
                activity_id: activity.id,
                expected: self.trip_id,
                found: activity.trip_id,
            });
        }

        if let Some(existing) = self.activities.get_mut(&activity.id) {
            let schedule = existing.schedule;
            let coordinates = existing.location.coordinates;
            *existing = activity;
            existing.schedule = schedule;
            if existing.location.coordinates.is_none() {
                existing.location.coordinates = coordinates;
            }
            return Ok(Vec::new());
        }

        let id = activity.id;
        let assignment = activity.schedule;
        self.activities.insert(id, activity);
        match assignment {
            Some(assignment) => {
                self.index
                    .insert(id, assignment.slot, Some(assignment.position as usize));
                Ok(self.renumber([assignment.slot]))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Move (or first place) an activity into `slot`
    ///
    /// `at` is the position in the destination bucket after the activity
    /// has left its old one; `None` or an index past the end appends.
    pub fn place(
        &mut self,
        id: ActivityId,
        slot: ScheduleSlot,
        at: Option<usize>,
    ) -> Result<PlacementChange, ScheduleError> {
        if !self.activities.contains_key(&id) {
            return Err(ScheduleError::UnknownActivity(id));
        }

        let previous = self.index.remove(id).map(|(slot, _)| slot);
        self.index.insert(id, slot, at);

        let mut touched = vec![slot];
        if let Some(prev) = previous.filter(|p| *p != slot) {
            touched.push(prev);
        }
        let changed = self.renumber(touched);

        let activity = self
            .activities
            .get(&id)
            .cloned()
            .ok_or(ScheduleError::UnknownActivity(id))?;

        Ok(PlacementChange {
            activity,
            previous,
            changed,
        })
    }

    /// Clear an activity's slot; `Ok(None)` if it was not scheduled
    pub fn unschedule(&mut self, id: ActivityId) -> Result<Option<PlacementChange>, ScheduleError> {
        let activity = self
            .activities
            .get_mut(&id)
            .ok_or(ScheduleError::UnknownActivity(id))?;

        let Some((previous, _)) = self.index.remove(id) else {
            return Ok(None);
        };
        activity.schedule = None;
        let cleared = activity.clone();

        let mut changed = vec![cleared.clone()];
        changed.extend(self.renumber([previous]));

        Ok(Some(PlacementChange {
            activity: cleared,
            previous: Some(previous),
            changed,
        }))
    }

    /// The three buckets of one date plus their summed cost
    pub fn daily_summary(&self, date: NaiveDate) -> DailySummary {
        let morning = self.bucket_activities(ScheduleSlot::new(date, TimeSlot::Morning));
        let afternoon = self.bucket_activities(ScheduleSlot::new(date, TimeSlot::Afternoon));
        let evening = self.bucket_activities(ScheduleSlot::new(date, TimeSlot::Evening));

        let total_cost = morning
            .iter()
            .chain(&afternoon)
            .chain(&evening)
            .map(Activity::cost)
            .sum();

        DailySummary {
            date,
            morning,
            afternoon,
            evening,
            total_cost,
        }
    }

    /// One summary per date in `start..=end`
    pub fn overview(&self, start: NaiveDate, end: NaiveDate) -> TripOverview {
        let days: Vec<DailySummary> = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| self.daily_summary(d))
            .collect();
        let total_cost = days.iter().map(|d| d.total_cost).sum();
        TripOverview { days, total_cost }
    }

    /// Advisory check: more than one must-do activity in `slot`
    pub fn detect_conflicts(&self, slot: ScheduleSlot) -> Option<SlotConflict> {
        let must_do: Vec<ActivityId> = self
            .index
            .bucket(&slot)
            .iter()
            .filter(|id| {
                self.activities
                    .get(*id)
                    .is_some_and(|a| a.priority == Priority::MustDo)
            })
            .copied()
            .collect();

        (must_do.len() > 1).then_some(SlotConflict { slot, must_do })
    }

    /// Activities without a slot, oldest first
    pub fn unscheduled(&self) -> Vec<Activity> {
        let mut pending: Vec<Activity> = self
            .activities
            .values()
            .filter(|a| !a.is_scheduled())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending
    }

    /// Store resolved coordinates unless the activity already has some
    ///
    /// Returns the updated activity, or `None` when nothing changed.
    pub fn merge_coordinates(
        &mut self,
        id: ActivityId,
        coordinates: Coordinates,
    ) -> Result<Option<Activity>, ScheduleError> {
        let activity = self
            .activities
            .get_mut(&id)
            .ok_or(ScheduleError::UnknownActivity(id))?;

        if activity.location.coordinates.is_some() {
            return Ok(None);
        }
        activity.location.coordinates = Some(coordinates);
        Ok(Some(activity.clone()))
    }

    fn bucket_activities(&self, slot: ScheduleSlot) -> Vec<Activity> {
        self.index
            .bucket(&slot)
            .iter()
            .filter_map(|id| self.activities.get(id))
            .cloned()
            .collect()
    }

    /// Rewrite slot records of every member of `slots` to match the index
    fn renumber(&mut self, slots: impl IntoIterator<Item = ScheduleSlot>) -> Vec<Activity> {
        let mut changed = Vec::new();
        for slot in slots {
            for (position, id) in self.index.bucket(&slot).iter().enumerate() {
                let Some(activity) = self.activities.get_mut(id) else {
                    continue;
                };
                let assignment = SlotAssignment {
                    slot,
                    position: position as u32,
                };
                if activity.schedule != Some(assignment) {
                    activity.schedule = Some(assignment);
                    changed.push(activity.clone());
                }
            }
        }
        changed
    }
}
