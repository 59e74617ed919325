//! Fake external collaborators
//!
//! Call counters are atomics so tests can assert how many requests actually
//! left the process.

use async_trait::async_trait;
use chrono::NaiveDate;
use famtrip_common::models::{
    Activity, ActivityCandidate, Coordinates, DailyForecast, Vote, WeatherSnapshot,
};
use famtrip_common::{CandidateId, MemberId, TripId};
use famtrip_planner::enrichment::providers::{AddressResolver, ProviderError, WeatherProvider};
use famtrip_planner::store::{EntityStore, InMemoryStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Address resolver answering from a fixed table
pub struct FakeResolver {
    answers: Mutex<HashMap<String, Coordinates>>,
    latency: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every lookup sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_answer(self, address: &str, coordinates: Coordinates) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(address.to_string(), coordinates);
        self
    }

    /// Make every lookup fail with a 503 until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for FakeResolver {
    async fn lookup(&self, address: &str) -> Result<Coordinates, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Status(503, "unavailable".to_string()));
        }
        self.answers
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(address.to_string()))
    }
}

/// Weather provider returning a canned snapshot
pub struct FakeWeather {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeWeather {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: 31,
            feels_like: 35,
            humidity: 70,
            condition: "Clear".to_string(),
            description: "Clear Sky".to_string(),
            forecast_days: vec![DailyForecast {
                date: NaiveDate::from_ymd_opt(2025, 7, 27).unwrap(),
                min_temp: 26,
                max_temp: 33,
                condition: "Clear".to_string(),
            }],
        }
    }
}

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn lookup(&self, _coordinates: Coordinates) -> Result<WeatherSnapshot, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("connection reset".to_string()));
        }
        Ok(Self::snapshot())
    }
}

/// In-memory store whose writes can be switched off
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_activities: AtomicBool,
    fail_candidates: AtomicBool,
    fail_votes: AtomicBool,
    activity_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_activities: AtomicBool::new(false),
            fail_candidates: AtomicBool::new(false),
            fail_votes: AtomicBool::new(false),
            activity_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_activity_writes(&self, fail: bool) {
        self.fail_activities.store(fail, Ordering::SeqCst);
    }

    pub fn fail_candidate_writes(&self, fail: bool) {
        self.fail_candidates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_vote_writes(&self, fail: bool) {
        self.fail_votes.store(fail, Ordering::SeqCst);
    }

    /// Successful activity saves so far
    pub fn activity_writes(&self) -> usize {
        self.activity_writes.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn load_activities(&self, trip_id: TripId) -> Result<Vec<Activity>, StoreError> {
        self.inner.load_activities(trip_id).await
    }

    async fn load_candidates(&self, trip_id: TripId) -> Result<Vec<ActivityCandidate>, StoreError> {
        self.inner.load_candidates(trip_id).await
    }

    async fn load_votes(&self, trip_id: TripId) -> Result<Vec<Vote>, StoreError> {
        self.inner.load_votes(trip_id).await
    }

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        Self::check(&self.fail_activities)?;
        self.inner.save_activity(activity).await?;
        self.activity_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_candidate(&self, candidate: &ActivityCandidate) -> Result<(), StoreError> {
        Self::check(&self.fail_candidates)?;
        self.inner.save_candidate(candidate).await
    }

    async fn save_vote(&self, trip_id: TripId, vote: &Vote) -> Result<(), StoreError> {
        Self::check(&self.fail_votes)?;
        self.inner.save_vote(trip_id, vote).await
    }

    async fn delete_vote(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_votes)?;
        self.inner.delete_vote(trip_id, candidate_id, member_id).await
    }
}
