//! Integration tests for concurrent access patterns
//!
//! Many family members acting at once on the same trip must never break
//! slot exclusivity, tally consistency or promotion atomicity.

mod helpers;

use famtrip_common::models::{Activity, ActivityCategory};
use famtrip_common::{MemberId, TripId};
use famtrip_planner::store::{EntityStore, InMemoryStore};
use famtrip_planner::{PlanningCoordinator, PlanningError};
use helpers::{coordinator_with, day, seed_trip, FakeResolver, FakeWeather};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

fn coordinator(store: Arc<InMemoryStore>) -> PlanningCoordinator {
    coordinator_with(
        store,
        Arc::new(FakeResolver::new()),
        Arc::new(FakeWeather::new()),
    )
}

async fn seed_activities(store: &InMemoryStore, trip_id: TripId, count: usize) -> Vec<Activity> {
    let mut activities = Vec::new();
    for i in 0..count {
        let activity = Activity::new(trip_id, format!("Stop {i}"), ActivityCategory::Sightseeing)
            .with_cost(5.0);
        store.save_activity(&activity).await.unwrap();
        activities.push(activity);
    }
    activities
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_keep_positions_unique() {
    let store = Arc::new(InMemoryStore::new());
    let trip_id = TripId::new();
    let activities = seed_activities(&store, trip_id, 12).await;
    let coordinator = coordinator(store.clone());

    let mut join_set = JoinSet::new();
    for (i, activity) in activities.iter().enumerate() {
        let coordinator = coordinator.clone();
        let id = activity.id;
        // Everyone piles into the same two slots, some asking for the front
        let slot = if i % 2 == 0 { "morning" } else { "afternoon" };
        let index = (i % 3 == 0).then_some(0);
        join_set.spawn(async move {
            coordinator
                .move_activity(trip_id, id, day(27), slot, index)
                .await
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    let summary = coordinator.get_daily_summary(trip_id, day(27)).await.unwrap();
    assert_eq!(summary.activity_count(), 12);
    assert_eq!(summary.total_cost, 60.0);

    for bucket in [&summary.morning, &summary.afternoon] {
        let positions: Vec<u32> = bucket.iter().map(|a| a.schedule.unwrap().position).collect();
        let expected: Vec<u32> = (0..bucket.len() as u32).collect();
        assert_eq!(positions, expected);
    }

    // The store agrees with memory
    for activity in summary.morning.iter().chain(&summary.afternoon) {
        let stored = store.activity(activity.id).await.unwrap();
        assert_eq!(stored.schedule, activity.schedule);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_of_one_activity_leave_single_membership() {
    let store = Arc::new(InMemoryStore::new());
    let trip_id = TripId::new();
    let activity_id = seed_activities(&store, trip_id, 1).await[0].id;
    let coordinator = coordinator(store);

    let mut join_set = JoinSet::new();
    for i in 0..20u32 {
        let coordinator = coordinator.clone();
        let slot = ["morning", "afternoon", "evening"][(i % 3) as usize];
        join_set.spawn(async move {
            coordinator
                .move_activity(trip_id, activity_id, day(27 + i % 2), slot, None)
                .await
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    let mut seen = 0;
    for d in [day(27), day(28)] {
        seen += coordinator
            .get_daily_summary(trip_id, d)
            .await
            .unwrap()
            .activity_count();
    }
    assert_eq!(seen, 1);
}

// ============================================================================
// Voting and promotion
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_are_all_counted() {
    let store = Arc::new(InMemoryStore::new());
    let trip = seed_trip(store.as_ref()).await;
    let (trip_id, candidate) = (trip.trip_id, trip.candidates[0].id);
    let coordinator = coordinator(store.clone());

    let mut join_set = JoinSet::new();
    for i in 0..20 {
        let coordinator = coordinator.clone();
        let value = if i % 4 == 0 { "disfavor" } else { "favor" };
        join_set.spawn(async move {
            coordinator
                .cast_vote(trip_id, candidate, MemberId::new(), value)
                .await
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    let tally = coordinator.tally(trip.trip_id, candidate).await.unwrap();
    assert_eq!(tally.participant_count, 20);
    assert_eq!(tally.favor_count, 15);
    assert_eq!(tally.disfavor_count, 5);
    assert_eq!(store.vote_count(trip.trip_id).await, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_promotions_succeed_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let trip = seed_trip(store.as_ref()).await;
    let (trip_id, candidate) = (trip.trip_id, trip.candidates[0].id);
    let coordinator = coordinator(store);

    let mut join_set = JoinSet::new();
    for slot in ["morning", "afternoon", "evening", "morning", "evening"] {
        let coordinator = coordinator.clone();
        join_set.spawn(async move {
            coordinator
                .promote_candidate(trip_id, candidate, day(28), slot)
                .await
        });
    }

    let mut promoted = Vec::new();
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            Ok(activity) => promoted.push(activity),
            Err(e) => assert_eq!(e, PlanningError::AlreadyPromoted(candidate)),
        }
    }
    assert_eq!(promoted.len(), 1);

    let summary = coordinator.get_daily_summary(trip.trip_id, day(28)).await.unwrap();
    assert_eq!(summary.activity_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_votes_racing_promotion_are_either_counted_or_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let trip = seed_trip(store.as_ref()).await;
    let (trip_id, candidate) = (trip.trip_id, trip.candidates[1].id);
    let coordinator = coordinator(store);

    let mut join_set = JoinSet::new();
    for i in 0..30 {
        let coordinator = coordinator.clone();
        join_set.spawn(async move {
            if i == 15 {
                coordinator
                    .promote_candidate(trip_id, candidate, day(29), "evening")
                    .await
                    .map(|_| false)
            } else {
                coordinator
                    .cast_vote(trip_id, candidate, MemberId::new(), "favor")
                    .await
                    .map(|_| true)
            }
        });
    }

    let mut accepted = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            Ok(true) => accepted += 1,
            Ok(false) => {}
            Err(e) => assert_eq!(e, PlanningError::CandidatePromoted(candidate)),
        }
    }

    let tally = coordinator.tally(trip.trip_id, candidate).await.unwrap();
    assert_eq!(tally.favor_count, accepted);
}

// ============================================================================
// Trip isolation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trips_are_isolated() {
    let store = Arc::new(InMemoryStore::new());
    let first = seed_trip(store.as_ref()).await;
    let second = seed_trip(store.as_ref()).await;
    let coordinator = coordinator(store);

    let mut join_set = JoinSet::new();
    for trip in [&first, &second] {
        for activity in &trip.activities {
            let coordinator = coordinator.clone();
            let (trip_id, activity_id) = (trip.trip_id, activity.id);
            join_set.spawn(async move {
                coordinator
                    .move_activity(trip_id, activity_id, day(27), "morning", None)
                    .await
            });
        }
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    for trip in [&first, &second] {
        let summary = coordinator.get_daily_summary(trip.trip_id, day(27)).await.unwrap();
        let ids: HashSet<_> = summary.morning.iter().map(|a| a.id).collect();
        let expected: HashSet<_> = trip.activities.iter().map(|a| a.id).collect();
        assert_eq!(ids, expected);
    }
    assert_eq!(coordinator.loaded_trips().await, 2);
}
