//! Entity store boundary
//!
//! The planner keeps each loaded trip in memory and writes through this
//! trait after every mutation. Storage technology is the implementor's
//! concern.

use async_trait::async_trait;
use famtrip_common::models::{Activity, ActivityCandidate, Vote};
use famtrip_common::{ActivityId, CandidateId, MemberId, TripId};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable or failed; the operation may succeed later
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the record
    #[error("Store rejected write: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load_activities(&self, trip_id: TripId) -> Result<Vec<Activity>, StoreError>;

    async fn load_candidates(&self, trip_id: TripId) -> Result<Vec<ActivityCandidate>, StoreError>;

    async fn load_votes(&self, trip_id: TripId) -> Result<Vec<Vote>, StoreError>;

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError>;

    async fn save_candidate(&self, candidate: &ActivityCandidate) -> Result<(), StoreError>;

    async fn save_vote(&self, trip_id: TripId, vote: &Vote) -> Result<(), StoreError>;

    async fn delete_vote(
        &self,
        trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
    ) -> Result<(), StoreError>;
}

/// Process-local store, for tests and single-process demos
#[derive(Default)]
pub struct InMemoryStore {
    activities: RwLock<HashMap<ActivityId, Activity>>,
    candidates: RwLock<HashMap<CandidateId, ActivityCandidate>>,
    votes: RwLock<HashMap<(CandidateId, MemberId), (TripId, Vote)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn activity(&self, id: ActivityId) -> Option<Activity> {
        self.activities.read().await.get(&id).cloned()
    }

    pub async fn candidate(&self, id: CandidateId) -> Option<ActivityCandidate> {
        self.candidates.read().await.get(&id).cloned()
    }

    pub async fn vote_count(&self, trip_id: TripId) -> usize {
        self.votes
            .read()
            .await
            .values()
            .filter(|(trip, _)| *trip == trip_id)
            .count()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn load_activities(&self, trip_id: TripId) -> Result<Vec<Activity>, StoreError> {
        Ok(self
            .activities
            .read()
            .await
            .values()
            .filter(|a| a.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn load_candidates(&self, trip_id: TripId) -> Result<Vec<ActivityCandidate>, StoreError> {
        Ok(self
            .candidates
            .read()
            .await
            .values()
            .filter(|c| c.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn load_votes(&self, trip_id: TripId) -> Result<Vec<Vote>, StoreError> {
        Ok(self
            .votes
            .read()
            .await
            .values()
            .filter(|(trip, _)| *trip == trip_id)
            .map(|(_, vote)| vote.clone())
            .collect())
    }

    async fn save_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        self.activities
            .write()
            .await
            .insert(activity.id, activity.clone());
        Ok(())
    }

    async fn save_candidate(&self, candidate: &ActivityCandidate) -> Result<(), StoreError> {
        self.candidates
            .write()
            .await
            .insert(candidate.id, candidate.clone());
        Ok(())
    }

    async fn save_vote(&self, trip_id: TripId, vote: &Vote) -> Result<(), StoreError> {
        self.votes
            .write()
            .await
            .insert((vote.candidate_id, vote.member_id), (trip_id, vote.clone()));
        Ok(())
    }

    async fn delete_vote(
        &self,
        _trip_id: TripId,
        candidate_id: CandidateId,
        member_id: MemberId,
    ) -> Result<(), StoreError> {
        self.votes.write().await.remove(&(candidate_id, member_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use famtrip_common::models::{ActivityCategory, VoteValue};

    #[tokio::test]
    async fn test_loads_are_trip_scoped() {
        let store = InMemoryStore::new();
        let (ours, theirs) = (TripId::new(), TripId::new());
        store
            .save_activity(&Activity::new(ours, "Castle", ActivityCategory::Sightseeing))
            .await
            .unwrap();
        store
            .save_activity(&Activity::new(theirs, "Tower", ActivityCategory::Sightseeing))
            .await
            .unwrap();

        let loaded = store.load_activities(ours).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Castle");
    }

    #[tokio::test]
    async fn test_vote_upsert_and_delete() {
        let store = InMemoryStore::new();
        let trip = TripId::new();
        let vote = Vote {
            candidate_id: CandidateId::new(),
            member_id: MemberId::new(),
            value: VoteValue::Favor,
            cast_at: Utc::now(),
        };

        store.save_vote(trip, &vote).await.unwrap();
        store
            .save_vote(
                trip,
                &Vote {
                    value: VoteValue::Disfavor,
                    ..vote.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.vote_count(trip).await, 1);
        assert_eq!(store.load_votes(trip).await.unwrap()[0].value, VoteValue::Disfavor);

        store
            .delete_vote(trip, vote.candidate_id, vote.member_id)
            .await
            .unwrap();
        assert_eq!(store.vote_count(trip).await, 0);
    }
}
