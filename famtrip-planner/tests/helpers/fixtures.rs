//! Trip fixtures and coordinator wiring

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use famtrip_common::events::EventBus;
use famtrip_common::models::{
    Activity, ActivityCandidate, ActivityCategory, Coordinates, Location, Priority,
};
use famtrip_common::TripId;
use famtrip_planner::enrichment::providers::{AddressResolver, WeatherProvider};
use famtrip_planner::store::EntityStore;
use famtrip_planner::{EnrichmentCache, EnrichmentConfig, PlanningCoordinator};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const CASTLE_ADDRESS: &str = "1-1 Osakajo, Chuo Ward, Osaka";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
}

pub fn osaka() -> Coordinates {
    Coordinates::new(34.6873, 135.5262).unwrap()
}

/// Generous quotas and short waits so tests never trip the limiter by accident
pub fn test_config() -> EnrichmentConfig {
    EnrichmentConfig {
        geocode_rate: NonZeroU32::new(100).unwrap(),
        geocode_burst: NonZeroU32::new(100).unwrap(),
        weather_per_minute: NonZeroU32::new(600).unwrap(),
        lookup_timeout: Duration::from_secs(2),
        rate_limit_wait: Duration::from_millis(50),
        ..EnrichmentConfig::default()
    }
}

pub fn coordinator_with(
    store: Arc<dyn EntityStore>,
    resolver: Arc<dyn AddressResolver>,
    weather: Arc<dyn WeatherProvider>,
) -> PlanningCoordinator {
    let cache = EnrichmentCache::new(resolver, weather, test_config());
    PlanningCoordinator::new(store, cache, EventBus::new(64))
}

/// IDs of the records written by [`seed_trip`]
pub struct SeededTrip {
    pub trip_id: TripId,
    /// Castle (address, cost 25), Aquarium (must-do, cost 40), Ramen (no cost)
    pub activities: Vec<Activity>,
    /// Two candidates, the first created earlier
    pub candidates: Vec<ActivityCandidate>,
}

impl SeededTrip {
    pub fn castle(&self) -> &Activity {
        &self.activities[0]
    }

    pub fn aquarium(&self) -> &Activity {
        &self.activities[1]
    }

    pub fn ramen(&self) -> &Activity {
        &self.activities[2]
    }
}

pub async fn seed_trip(store: &dyn EntityStore) -> SeededTrip {
    let trip_id = TripId::new();

    let castle = Activity::new(trip_id, "Osaka Castle", ActivityCategory::Sightseeing)
        .with_cost(25.0)
        .with_location(Location::with_address(CASTLE_ADDRESS));
    let aquarium = Activity::new(trip_id, "Kaiyukan", ActivityCategory::Sightseeing)
        .with_cost(40.0)
        .with_priority(Priority::MustDo)
        .with_location(Location {
            coordinates: Some(Coordinates::new(34.6545, 135.4290).unwrap()),
            ..Location::default()
        });
    let ramen = Activity::new(trip_id, "Ramen lunch", ActivityCategory::Food);

    let base = Utc::now();
    let boat = ActivityCandidate::new(trip_id, "Aqualiner boat", ActivityCategory::Sightseeing)
        .with_cost(18.0)
        .created_at(base - ChronoDuration::minutes(10));
    let market = ActivityCandidate::new(trip_id, "Kuromon Market", ActivityCategory::Food)
        .with_location(Location::with_address("2 Chome Nipponbashi, Osaka"))
        .created_at(base);

    let activities = vec![castle, aquarium, ramen];
    for activity in &activities {
        store.save_activity(activity).await.unwrap();
    }
    let candidates = vec![boat, market];
    for candidate in &candidates {
        store.save_candidate(candidate).await.unwrap();
    }

    SeededTrip {
        trip_id,
        activities,
        candidates,
    }
}
