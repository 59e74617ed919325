//! Voting Engine
//!
//! Holds a trip's candidates and the live vote of each family member on
//! each of them. Tallies are always recomputed from the live votes.
//!
//! Candidate lifecycle:
//! - open: accepts votes, ranked
//! - promoted: frozen, votes rejected, still tallied
//! - archived: gone from voting and ranking

mod ranking;

pub use ranking::{RankedCandidate, VoteDistribution, VotingStatistics};

use crate::schedule::{PlacementChange, ScheduleError, SchedulingEngine};
use chrono::Utc;
use famtrip_common::models::{
    Activity, ActivityCandidate, Promotion, ScheduleSlot, Tally, Vote, VoteChoice,
};
use famtrip_common::{CandidateId, MemberId, TripId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("Candidate not found: {0}")]
    CandidateNotFound(CandidateId),

    #[error("Candidate {0} has been promoted and no longer accepts changes")]
    CandidatePromoted(CandidateId),

    #[error("Candidate {0} was already promoted")]
    AlreadyPromoted(CandidateId),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Outcome of [`VotingEngine::cast_vote`]
#[derive(Debug, Clone)]
pub struct VoteChange {
    pub tally: Tally,
    /// The vote now on record, `None` after a neutral vote
    pub stored: Option<Vote>,
    /// A neutral vote deleted an existing record
    pub removed: bool,
}

/// Outcome of [`VotingEngine::promote`]
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    /// The frozen candidate
    pub candidate: ActivityCandidate,
    pub placement: PlacementChange,
}

impl PromotionOutcome {
    pub fn activity(&self) -> &Activity {
        &self.placement.activity
    }
}

#[derive(Debug, Clone)]
pub struct VotingEngine {
    trip_id: TripId,
    candidates: HashMap<CandidateId, ActivityCandidate>,
    votes: HashMap<CandidateId, HashMap<MemberId, Vote>>,
}

impl VotingEngine {
    pub fn new(trip_id: TripId) -> Self {
        Self {
            trip_id,
            candidates: HashMap::new(),
            votes: HashMap::new(),
        }
    }

    /// Build from stored candidates and votes
    ///
    /// Votes for unknown candidates are dropped. If the store holds several
    /// votes for the same (candidate, member), the latest one wins.
    pub fn from_parts(
        trip_id: TripId,
        candidates: Vec<ActivityCandidate>,
        votes: Vec<Vote>,
    ) -> Self {
        let mut engine = Self::new(trip_id);
        for candidate in candidates {
            if candidate.trip_id == trip_id {
                engine.candidates.insert(candidate.id, candidate);
            }
        }

        for vote in votes {
            if !engine.candidates.contains_key(&vote.candidate_id) {
                tracing::warn!(
                    trip_id = %trip_id,
                    candidate_id = %vote.candidate_id,
                    "Dropping vote for unknown candidate"
                );
                continue;
            }
            let member_votes = engine.votes.entry(vote.candidate_id).or_default();
            let newer = member_votes
                .get(&vote.member_id)
                .map_or(true, |existing| vote.cast_at >= existing.cast_at);
            if newer {
                member_votes.insert(vote.member_id, vote);
            }
        }
        engine
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    /// Any non-archived candidate, promoted ones included
    pub fn candidate(&self, id: CandidateId) -> Option<&ActivityCandidate> {
        self.candidates.get(&id).filter(|c| !c.archived)
    }

    pub fn open_candidates(&self) -> impl Iterator<Item = &ActivityCandidate> {
        self.candidates.values().filter(|c| c.is_open())
    }

    /// Add a newly discovered candidate, or refresh an open one
    pub fn track(&mut self, candidate: ActivityCandidate) -> Result<(), VoteError> {
        if candidate.trip_id != self.trip_id {
            return Err(VoteError::CandidateNotFound(candidate.id));
        }
        if let Some(existing) = self.candidates.get(&candidate.id) {
            if existing.is_promoted() {
                return Err(VoteError::CandidatePromoted(candidate.id));
            }
        }
        self.candidates.insert(candidate.id, candidate);
        Ok(())
    }

    /// Record, replace or (for neutral) withdraw a member's vote
    pub fn cast_vote(
        &mut self,
        candidate_id: CandidateId,
        member_id: MemberId,
        choice: VoteChoice,
    ) -> Result<VoteChange, VoteError> {
        let candidate = self
            .candidate(candidate_id)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        if candidate.is_promoted() {
            return Err(VoteError::CandidatePromoted(candidate_id));
        }

        let member_votes = self.votes.entry(candidate_id).or_default();
        let (stored, removed) = match choice.stored_value() {
            Some(value) => {
                let vote = Vote {
                    candidate_id,
                    member_id,
                    value,
                    cast_at: Utc::now(),
                };
                member_votes.insert(member_id, vote.clone());
                (Some(vote), false)
            }
            None => (None, member_votes.remove(&member_id).is_some()),
        };
        if member_votes.is_empty() {
            self.votes.remove(&candidate_id);
        }

        Ok(VoteChange {
            tally: self.tally_of(candidate_id),
            stored,
            removed,
        })
    }

    pub fn tally(&self, candidate_id: CandidateId) -> Result<Tally, VoteError> {
        self.candidate(candidate_id)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        Ok(self.tally_of(candidate_id))
    }

    /// Live votes on a candidate, ordered by member
    pub fn votes_for(&self, candidate_id: CandidateId) -> Result<Vec<Vote>, VoteError> {
        self.candidate(candidate_id)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        let mut votes: Vec<Vote> = self
            .votes
            .get(&candidate_id)
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default();
        votes.sort_by_key(|v| v.member_id);
        Ok(votes)
    }

    /// Turn a candidate into a scheduled activity
    ///
    /// The activity is tracked and placed before the candidate is frozen; on
    /// error nothing has been frozen, but the schedule may already hold the
    /// new activity, so callers must discard both engines' state together.
    pub fn promote(
        &mut self,
        candidate_id: CandidateId,
        slot: ScheduleSlot,
        schedule: &mut SchedulingEngine,
    ) -> Result<PromotionOutcome, VoteError> {
        let candidate = self
            .candidate(candidate_id)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        if candidate.is_promoted() {
            return Err(VoteError::AlreadyPromoted(candidate_id));
        }

        let activity = activity_from(candidate);
        let activity_id = activity.id;
        schedule.track(activity)?;
        let placement = schedule.place(activity_id, slot, None)?;

        let candidate = self
            .candidates
            .get_mut(&candidate_id)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        candidate.promotion = Some(Promotion {
            activity_id,
            promoted_at: Utc::now(),
        });

        Ok(PromotionOutcome {
            candidate: candidate.clone(),
            placement,
        })
    }

    /// Withdraw an open candidate from voting and ranking
    ///
    /// Its votes are kept so the record stays recomputable.
    pub fn archive(&mut self, candidate_id: CandidateId) -> Result<ActivityCandidate, VoteError> {
        let candidate = self
            .candidates
            .get_mut(&candidate_id)
            .filter(|c| !c.archived)
            .ok_or(VoteError::CandidateNotFound(candidate_id))?;
        if candidate.is_promoted() {
            return Err(VoteError::CandidatePromoted(candidate_id));
        }
        candidate.archived = true;
        Ok(candidate.clone())
    }

    fn tally_of(&self, candidate_id: CandidateId) -> Tally {
        self.votes
            .get(&candidate_id)
            .map(|v| Tally::from_votes(v.values()))
            .unwrap_or_default()
    }
}

fn activity_from(candidate: &ActivityCandidate) -> Activity {
    let mut activity = Activity::new(candidate.trip_id, candidate.name.clone(), candidate.category)
        .with_location(candidate.location.clone());
    activity.description = candidate.description.clone();
    activity.estimated_cost = candidate.estimated_cost.map(|c| c.max(0.0));
    activity
}
