//! Schedule Index
//!
//! Maps each (date, time slot) bucket to its ordered list of activity IDs,
//! with a reverse map so membership checks and removals stay cheap.
//!
//! Every activity appears in at most one bucket, at exactly one position.

use chrono::NaiveDate;
use famtrip_common::models::{Activity, ScheduleSlot};
use famtrip_common::ActivityId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    /// Buckets in chronological order; empty buckets are dropped
    buckets: BTreeMap<ScheduleSlot, Vec<ActivityId>>,

    /// Reverse map: activity → bucket it sits in
    locations: HashMap<ActivityId, ScheduleSlot>,
}

impl ScheduleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored activities
    ///
    /// Bucket order follows the stored positions; duplicate or missing
    /// positions are settled by creation time, then ID.
    pub fn build<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut scheduled: Vec<(&Activity, ScheduleSlot, u32)> = activities
            .into_iter()
            .filter_map(|a| a.schedule.map(|s| (a, s.slot, s.position)))
            .collect();
        scheduled.sort_by(|(a, a_slot, a_pos), (b, b_slot, b_pos)| {
            a_slot
                .cmp(b_slot)
                .then(a_pos.cmp(b_pos))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut index = Self::new();
        for (activity, slot, _) in scheduled {
            index.insert(activity.id, slot, None);
        }
        index
    }

    /// Put `id` into `slot` at `at` (appends when `None` or past the end)
    ///
    /// An activity already indexed elsewhere is moved, never duplicated.
    /// Returns the position it landed at.
    pub fn insert(&mut self, id: ActivityId, slot: ScheduleSlot, at: Option<usize>) -> usize {
        self.remove(id);

        let bucket = self.buckets.entry(slot).or_default();
        let position = at.map_or(bucket.len(), |i| i.min(bucket.len()));
        bucket.insert(position, id);
        self.locations.insert(id, slot);
        position
    }

    /// Take `id` out of its bucket, returning where it was
    pub fn remove(&mut self, id: ActivityId) -> Option<(ScheduleSlot, usize)> {
        let slot = self.locations.remove(&id)?;
        let bucket = self.buckets.get_mut(&slot)?;
        let position = bucket.iter().position(|a| *a == id)?;
        bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(&slot);
        }
        Some((slot, position))
    }

    pub fn slot_of(&self, id: ActivityId) -> Option<ScheduleSlot> {
        self.locations.get(&id).copied()
    }

    pub fn position_of(&self, id: ActivityId) -> Option<usize> {
        let slot = self.locations.get(&id)?;
        self.buckets.get(slot)?.iter().position(|a| *a == id)
    }

    /// Ordered members of one bucket (empty if nothing is scheduled there)
    pub fn bucket(&self, slot: &ScheduleSlot) -> &[ActivityId] {
        self.buckets.get(slot).map_or(&[], Vec::as_slice)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&ScheduleSlot, &[ActivityId])> {
        self.buckets.iter().map(|(slot, ids)| (slot, ids.as_slice()))
    }

    /// Dates with at least one scheduled activity, ascending
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.buckets.keys().map(|s| s.date).collect();
        dates.dedup();
        dates
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Number of scheduled activities
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
