//! Planning Coordinator
//!
//! Entry point for every caller. Each trip is loaded lazily from the entity
//! store and kept in memory behind one `RwLock`:
//! - writes (place, unschedule, vote, promote, archive) hold it exclusively
//!   for the whole mutate-then-persist step
//! - reads share it and always see a fully applied state
//! - trips never block each other
//!
//! A write that fails to persist puts the previous in-memory state back
//! before returning, so nothing half-applied is ever visible.
//!
//! Coordinate backfill runs on spawned tasks outside the trip lock and merges
//! its result under a short write lock of its own.

use crate::enrichment::providers::ProviderError;
use crate::enrichment::{CoordinateLookup, EnrichmentCache, WeatherLookup};
use crate::error::{PlanningError, PlanningResult};
use crate::schedule::{DailySummary, SchedulingEngine, SlotConflict, TripOverview};
use crate::store::EntityStore;
use crate::voting::{
    PromotionOutcome, RankedCandidate, VoteChange, VotingEngine, VotingStatistics,
};
use chrono::{NaiveDate, Utc};
use famtrip_common::config::{self, TomlConfig};
use famtrip_common::events::{EventBus, PlannerEvent};
use famtrip_common::models::{
    Activity, ActivityCandidate, Coordinates, ScheduleSlot, Tally, TimeSlot, Vote, VoteChoice,
};
use famtrip_common::{ActivityId, CandidateId, MemberId, TripId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};

/// Result of a move: the placed activity and any advisory must-do conflict
///
/// A conflict never blocks the move; callers decide what to do with it.
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub activity: Activity,
    pub conflict: Option<SlotConflict>,
}

#[derive(Clone)]
struct TripPlan {
    schedule: SchedulingEngine,
    voting: VotingEngine,
}

struct TripHandle {
    trip_id: TripId,
    plan: RwLock<TripPlan>,
    /// Activities with a coordinate lookup already running
    backfills: Mutex<HashSet<ActivityId>>,
}

struct CoordinatorInner {
    store: Arc<dyn EntityStore>,
    enrichment: EnrichmentCache,
    events: EventBus,
    trips: RwLock<HashMap<TripId, Arc<TripHandle>>>,
}

/// Shared planner façade; cheap to clone
#[derive(Clone)]
pub struct PlanningCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl PlanningCoordinator {
    pub fn new(store: Arc<dyn EntityStore>, enrichment: EnrichmentCache, events: EventBus) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                enrichment,
                events,
                trips: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Composition root: HTTP-backed enrichment and an event bus sized from config
    pub fn from_config(
        store: Arc<dyn EntityStore>,
        toml_config: &TomlConfig,
    ) -> Result<Self, ProviderError> {
        let api_key = config::resolve_openweather_api_key(toml_config);
        let enrichment = EnrichmentCache::http_backed(&toml_config.enrichment, api_key)?;
        Ok(Self::new(
            store,
            enrichment,
            EventBus::new(toml_config.events.capacity),
        ))
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.inner.events.subscribe()
    }

    pub fn enrichment(&self) -> &EnrichmentCache {
        &self.inner.enrichment
    }

    // ========================================
    // Schedule reads
    // ========================================

    pub async fn get_daily_summary(
        &self,
        trip_id: TripId,
        date: NaiveDate,
    ) -> PlanningResult<DailySummary> {
        let handle = self.trip(trip_id).await?;
        let summary = handle.plan.read().await.schedule.daily_summary(date);

        for activity in summary
            .morning
            .iter()
            .chain(&summary.afternoon)
            .chain(&summary.evening)
        {
            self.spawn_backfill(&handle, activity);
        }
        Ok(summary)
    }

    /// One summary per date in `start..=end`, plus the grand total
    pub async fn trip_overview(
        &self,
        trip_id: TripId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PlanningResult<TripOverview> {
        let handle = self.trip(trip_id).await?;
        let overview = handle.plan.read().await.schedule.overview(start, end);
        Ok(overview)
    }

    pub async fn unscheduled_activities(&self, trip_id: TripId) -> PlanningResult<Vec<Activity>> {
        let handle = self.trip(trip_id).await?;
        let pending = handle.plan.read().await.schedule.unscheduled();
        Ok(pending)
    }

    pub async fn detect_conflicts(
        &self,
        trip_id: TripId,
        date: NaiveDate,
        time_slot: &str,
    ) -> PlanningResult<Option<SlotConflict>> {
        let slot = ScheduleSlot::new(date, time_slot.parse::<TimeSlot>()?);
        let handle = self.trip(trip_id).await?;
        let conflict = handle.plan.read().await.schedule.detect_conflicts(slot);
        Ok(conflict)
    }

    // ========================================
    // Schedule writes
    // ========================================

    /// Place or move an activity into (date, time slot)
    ///
    /// `index` is the position inside the destination bucket; `None` or an
    /// index past the end appends.
    pub async fn move_activity(
        &self,
        trip_id: TripId,
        activity_id: ActivityId,
        date: NaiveDate,
        time_slot: &str,
        index: Option<usize>,
    ) -> PlanningResult<Placement> {
        let slot = ScheduleSlot::new(date, time_slot.parse::<TimeSlot>()?);
        let handle = self.trip(trip_id).await?;

        let (change, conflict) = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.schedule.clone();

            let change = plan.schedule.place(activity_id, slot, index)?;
            if let Err(e) = self.inner.persist_activities(&change.changed, &snapshot).await {
                plan.schedule = snapshot;
                return Err(e);
            }
            let conflict = plan.schedule.detect_conflicts(slot);
            (change, conflict)
        };

        tracing::debug!(
            trip_id = %trip_id,
            activity_id = %activity_id,
            slot = %slot,
            previous = ?change.previous,
            "Activity placed"
        );
        self.emit_placed(trip_id, &change.activity, change.previous);
        self.report_conflict(trip_id, conflict.as_ref());
        self.spawn_backfill(&handle, &change.activity);

        Ok(Placement {
            activity: change.activity,
            conflict,
        })
    }

    /// Clear an activity's slot; a no-op for an unscheduled activity
    pub async fn unschedule_activity(
        &self,
        trip_id: TripId,
        activity_id: ActivityId,
    ) -> PlanningResult<Activity> {
        let handle = self.trip(trip_id).await?;

        let change = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.schedule.clone();

            match plan.schedule.unschedule(activity_id)? {
                None => {
                    return plan
                        .schedule
                        .get(activity_id)
                        .cloned()
                        .ok_or(PlanningError::UnknownActivity(activity_id));
                }
                Some(change) => {
                    if let Err(e) = self.inner.persist_activities(&change.changed, &snapshot).await
                    {
                        plan.schedule = snapshot;
                        return Err(e);
                    }
                    change
                }
            }
        };

        if let Some(previous) = change.previous {
            self.inner.events.emit_lossy(PlannerEvent::ActivityUnscheduled {
                trip_id,
                activity_id,
                previous,
                timestamp: Utc::now(),
            });
        }
        Ok(change.activity)
    }

    /// Hand a newly created (or edited) activity to a loaded trip
    pub async fn track_activity(
        &self,
        trip_id: TripId,
        activity: Activity,
    ) -> PlanningResult<Activity> {
        let handle = self.trip(trip_id).await?;
        let activity_id = activity.id;

        let tracked = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.schedule.clone();

            let changed = plan.schedule.track(activity)?;
            if let Err(e) = self.inner.persist_activities(&changed, &snapshot).await {
                plan.schedule = snapshot;
                return Err(e);
            }
            plan.schedule
                .get(activity_id)
                .cloned()
                .ok_or(PlanningError::UnknownActivity(activity_id))?
        };

        self.spawn_backfill(&handle, &tracked);
        Ok(tracked)
    }

    // ========================================
    // Voting
    // ========================================

    /// Record a member's vote; `"neutral"` withdraws it
    pub async fn cast_vote(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
        value: &str,
    ) -> PlanningResult<Tally> {
        let choice = value.parse::<VoteChoice>()?;
        let handle = self.trip(trip_id).await?;

        let change = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.voting.clone();

            let change = plan.voting.cast_vote(candidate_id, member_id, choice)?;
            if let Err(e) = self.inner.persist_vote(trip_id, candidate_id, member_id, &change).await {
                plan.voting = snapshot;
                return Err(e);
            }
            change
        };

        tracing::debug!(
            trip_id = %trip_id,
            candidate_id = %candidate_id,
            member_id = %member_id,
            choice = ?choice,
            score = change.tally.score(),
            "Vote cast"
        );
        self.inner.events.emit_lossy(PlannerEvent::VoteCast {
            trip_id,
            candidate_id,
            member_id,
            tally: change.tally,
            timestamp: Utc::now(),
        });
        Ok(change.tally)
    }

    pub async fn tally(&self, trip_id: TripId, candidate_id: CandidateId) -> PlanningResult<Tally> {
        let handle = self.trip(trip_id).await?;
        let tally = handle.plan.read().await.voting.tally(candidate_id)?;
        Ok(tally)
    }

    pub async fn votes_for(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
    ) -> PlanningResult<Vec<Vote>> {
        let handle = self.trip(trip_id).await?;
        let votes = handle.plan.read().await.voting.votes_for(candidate_id)?;
        Ok(votes)
    }

    /// Open candidates, best first
    pub async fn get_ranking(&self, trip_id: TripId) -> PlanningResult<Vec<RankedCandidate>> {
        let handle = self.trip(trip_id).await?;
        let ranking = handle.plan.read().await.voting.rank();
        Ok(ranking)
    }

    pub async fn voting_statistics(
        &self,
        trip_id: TripId,
        family_size: usize,
    ) -> PlanningResult<VotingStatistics> {
        let handle = self.trip(trip_id).await?;
        let stats = handle.plan.read().await.voting.statistics(family_size);
        Ok(stats)
    }

    /// Hand a newly discovered candidate to a loaded trip
    pub async fn track_candidate(
        &self,
        trip_id: TripId,
        candidate: ActivityCandidate,
    ) -> PlanningResult<()> {
        let handle = self.trip(trip_id).await?;
        handle.plan.write().await.voting.track(candidate)?;
        Ok(())
    }

    /// Freeze a candidate and schedule the activity built from it
    ///
    /// Both become visible together or not at all.
    pub async fn promote_candidate(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
        date: NaiveDate,
        time_slot: &str,
    ) -> PlanningResult<Activity> {
        let slot = ScheduleSlot::new(date, time_slot.parse::<TimeSlot>()?);
        let handle = self.trip(trip_id).await?;

        let (outcome, conflict) = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.clone();

            let TripPlan { schedule, voting } = &mut *plan;
            let outcome = match voting.promote(candidate_id, slot, schedule) {
                Ok(outcome) => outcome,
                Err(e) => {
                    *plan = snapshot;
                    return Err(e.into());
                }
            };

            if let Err(e) = self.inner.persist_promotion(&outcome, &snapshot).await {
                *plan = snapshot;
                return Err(e);
            }
            let conflict = plan.schedule.detect_conflicts(slot);
            (outcome, conflict)
        };

        let activity = outcome.placement.activity;
        tracing::info!(
            trip_id = %trip_id,
            candidate_id = %candidate_id,
            activity_id = %activity.id,
            slot = %slot,
            "Candidate promoted"
        );
        self.inner.events.emit_lossy(PlannerEvent::CandidatePromoted {
            trip_id,
            candidate_id,
            activity_id: activity.id,
            slot,
            timestamp: Utc::now(),
        });
        self.emit_placed(trip_id, &activity, None);
        self.report_conflict(trip_id, conflict.as_ref());
        self.spawn_backfill(&handle, &activity);

        Ok(activity)
    }

    /// Withdraw an open candidate from voting and ranking
    pub async fn archive_candidate(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
    ) -> PlanningResult<ActivityCandidate> {
        let handle = self.trip(trip_id).await?;

        let archived = {
            let mut plan = handle.plan.write().await;
            let snapshot = plan.voting.clone();

            let archived = plan.voting.archive(candidate_id)?;
            if let Err(e) = self.inner.store.save_candidate(&archived).await {
                tracing::error!(
                    trip_id = %trip_id,
                    candidate_id = %candidate_id,
                    error = %e,
                    "Failed to persist archived candidate"
                );
                plan.voting = snapshot;
                return Err(e.into());
            }
            archived
        };

        self.inner.events.emit_lossy(PlannerEvent::CandidateArchived {
            trip_id,
            candidate_id,
            timestamp: Utc::now(),
        });
        Ok(archived)
    }

    // ========================================
    // Enrichment and trip lifecycle
    // ========================================

    /// Weather at an activity's coordinates; `Unavailable` if it has none
    pub async fn activity_weather(
        &self,
        trip_id: TripId,
        activity_id: ActivityId,
    ) -> PlanningResult<WeatherLookup> {
        let handle = self.trip(trip_id).await?;
        let coordinates = {
            let plan = handle.plan.read().await;
            let activity = plan
                .schedule
                .get(activity_id)
                .ok_or(PlanningError::UnknownActivity(activity_id))?;
            activity.location.coordinates
        };

        match coordinates {
            Some(c) => Ok(self
                .inner
                .enrichment
                .resolve_weather(c.latitude, c.longitude)
                .await),
            None => Ok(WeatherLookup::Unavailable),
        }
    }

    /// Drop a trip's in-memory state; the next call reloads it from the store
    pub async fn evict_trip(&self, trip_id: TripId) -> bool {
        let evicted = self.inner.trips.write().await.remove(&trip_id).is_some();
        if evicted {
            tracing::debug!(trip_id = %trip_id, "Trip evicted");
        }
        evicted
    }

    pub async fn loaded_trips(&self) -> usize {
        self.inner.trips.read().await.len()
    }

    /// Loaded trip state, reading it from the store on first use
    ///
    /// Store I/O happens without holding the trip map lock; if two callers
    /// race to load the same trip, the first to finish wins.
    async fn trip(&self, trip_id: TripId) -> PlanningResult<Arc<TripHandle>> {
        if let Some(handle) = self.inner.trips.read().await.get(&trip_id) {
            return Ok(Arc::clone(handle));
        }

        let store = &self.inner.store;
        let (activities, candidates, votes) = tokio::try_join!(
            store.load_activities(trip_id),
            store.load_candidates(trip_id),
            store.load_votes(trip_id),
        )
        .map_err(|e| {
            tracing::error!(trip_id = %trip_id, error = %e, "Failed to load trip");
            PlanningError::from(e)
        })?;

        let (activity_count, candidate_count) = (activities.len(), candidates.len());
        let plan = TripPlan {
            schedule: SchedulingEngine::from_activities(trip_id, activities),
            voting: VotingEngine::from_parts(trip_id, candidates, votes),
        };

        let mut trips = self.inner.trips.write().await;
        let handle = trips.entry(trip_id).or_insert_with(|| {
            tracing::info!(
                trip_id = %trip_id,
                activities = activity_count,
                candidates = candidate_count,
                "Trip loaded"
            );
            Arc::new(TripHandle {
                trip_id,
                plan: RwLock::new(plan),
                backfills: Mutex::new(HashSet::new()),
            })
        });
        Ok(Arc::clone(handle))
    }

    fn emit_placed(&self, trip_id: TripId, activity: &Activity, previous: Option<ScheduleSlot>) {
        if let Some(assignment) = activity.schedule {
            self.inner.events.emit_lossy(PlannerEvent::ActivityPlaced {
                trip_id,
                activity_id: activity.id,
                slot: assignment.slot,
                position: assignment.position,
                previous,
                timestamp: Utc::now(),
            });
        }
    }

    fn report_conflict(&self, trip_id: TripId, conflict: Option<&SlotConflict>) {
        let Some(conflict) = conflict else {
            return;
        };
        tracing::warn!(
            trip_id = %trip_id,
            slot = %conflict.slot,
            must_do = conflict.must_do.len(),
            "Multiple must-do activities share a slot"
        );
        self.inner.events.emit_lossy(PlannerEvent::SlotConflictDetected {
            trip_id,
            slot: conflict.slot,
            must_do: conflict.must_do.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Start a coordinate lookup for `activity` if it needs one
    ///
    /// At most one lookup per activity runs at a time. Never waits.
    fn spawn_backfill(&self, handle: &Arc<TripHandle>, activity: &Activity) {
        if !activity.needs_coordinates() {
            return;
        }
        {
            let mut running = handle
                .backfills
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !running.insert(activity.id) {
                return;
            }
        }

        let inner = Arc::clone(&self.inner);
        let handle = Arc::clone(handle);
        let activity_id = activity.id;
        let queries = activity.location.geocoding_queries();
        tokio::spawn(async move {
            inner.backfill(&handle, activity_id, queries).await;
            handle
                .backfills
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&activity_id);
        });
    }
}

impl CoordinatorInner {
    /// Save every changed activity
    ///
    /// On failure, records already written are put back to their `snapshot`
    /// versions (best effort) before the error is returned.
    async fn persist_activities(
        &self,
        changed: &[Activity],
        snapshot: &SchedulingEngine,
    ) -> PlanningResult<()> {
        for (written, activity) in changed.iter().enumerate() {
            if let Err(e) = self.store.save_activity(activity).await {
                tracing::error!(
                    trip_id = %activity.trip_id,
                    activity_id = %activity.id,
                    error = %e,
                    "Failed to persist activity"
                );
                for prior in changed[..written]
                    .iter()
                    .filter_map(|a| snapshot.get(a.id))
                {
                    if let Err(undo) = self.store.save_activity(prior).await {
                        tracing::error!(
                            activity_id = %prior.id,
                            error = %undo,
                            "Failed to restore activity after aborted write"
                        );
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn persist_vote(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
        change: &VoteChange,
    ) -> PlanningResult<()> {
        let result = match &change.stored {
            Some(vote) => self.store.save_vote(trip_id, vote).await,
            None if change.removed => {
                self.store
                    .delete_vote(trip_id, candidate_id, member_id)
                    .await
            }
            None => Ok(()),
        };

        result.map_err(|e| {
            tracing::error!(
                trip_id = %trip_id,
                candidate_id = %candidate_id,
                error = %e,
                "Failed to persist vote"
            );
            e.into()
        })
    }

    /// Frozen candidate first, then the new activity and any renumbered ones
    ///
    /// If the activities cannot be saved, the candidate is saved again in
    /// its unfrozen form.
    async fn persist_promotion(
        &self,
        outcome: &PromotionOutcome,
        snapshot: &TripPlan,
    ) -> PlanningResult<()> {
        let candidate = &outcome.candidate;
        if let Err(e) = self.store.save_candidate(candidate).await {
            tracing::error!(
                trip_id = %candidate.trip_id,
                candidate_id = %candidate.id,
                error = %e,
                "Failed to persist promoted candidate"
            );
            return Err(e.into());
        }

        if let Err(e) = self
            .persist_activities(&outcome.placement.changed, &snapshot.schedule)
            .await
        {
            if let Some(original) = snapshot.voting.candidate(candidate.id) {
                if let Err(undo) = self.store.save_candidate(original).await {
                    tracing::error!(
                        candidate_id = %candidate.id,
                        error = %undo,
                        "Failed to restore candidate after aborted promotion"
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn backfill(&self, handle: &TripHandle, activity_id: ActivityId, queries: Vec<String>) {
        let mut resolved: Option<Coordinates> = None;
        for query in &queries {
            if let CoordinateLookup::Resolved(coords) =
                self.enrichment.resolve_coordinates(query).await
            {
                resolved = Some(coords);
                break;
            }
        }

        let Some(coordinates) = resolved else {
            tracing::debug!(
                trip_id = %handle.trip_id,
                activity_id = %activity_id,
                "Coordinates unresolved, activity left without them"
            );
            return;
        };

        {
            let mut plan = handle.plan.write().await;
            let Some(current) = plan.schedule.get(activity_id) else {
                return;
            };
            if current.location.coordinates.is_some() {
                return;
            }

            let mut updated = current.clone();
            updated.location.coordinates = Some(coordinates);
            if let Err(e) = self.store.save_activity(&updated).await {
                tracing::error!(
                    trip_id = %handle.trip_id,
                    activity_id = %activity_id,
                    error = %e,
                    "Failed to persist resolved coordinates"
                );
                return;
            }
            if let Err(e) = plan.schedule.merge_coordinates(activity_id, coordinates) {
                tracing::warn!(activity_id = %activity_id, error = %e, "Coordinate merge skipped");
                return;
            }
        }

        tracing::debug!(
            trip_id = %handle.trip_id,
            activity_id = %activity_id,
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            "Coordinates merged"
        );
        self.events.emit_lossy(PlannerEvent::CoordinatesResolved {
            trip_id: handle.trip_id,
            activity_id,
            coordinates,
            timestamp: Utc::now(),
        });
    }
}
