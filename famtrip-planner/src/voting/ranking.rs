//! Deterministic candidate ranking and dashboard statistics

use famtrip_common::models::{ActivityCandidate, Tally, VoteValue};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use super::VotingEngine;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: ActivityCandidate,
    pub tally: Tally,
    pub score: i64,
    pub participant_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VoteDistribution {
    pub favor: u32,
    pub disfavor: u32,
}

/// Voting activity across a trip's open candidates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingStatistics {
    pub total_candidates: usize,
    pub total_votes: u32,
    pub family_size: usize,
    pub distribution: VoteDistribution,
    pub distinct_voters: usize,
    pub average_votes_per_candidate: f64,
    /// Cast votes over possible votes (candidates × family size); 0 when undefined
    pub participation_rate: f64,
}

/// Score desc, participants desc, creation asc, then ID
pub(crate) fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then(b.participant_count.cmp(&a.participant_count))
        .then(a.candidate.created_at.cmp(&b.candidate.created_at))
        .then(a.candidate.id.cmp(&b.candidate.id))
}

impl VotingEngine {
    /// Open candidates, best first
    ///
    /// Identical vote sets always produce the same order.
    pub fn rank(&self) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = self
            .open_candidates()
            .map(|candidate| {
                let tally = self.tally_of(candidate.id);
                RankedCandidate {
                    candidate: candidate.clone(),
                    score: tally.score(),
                    participant_count: tally.participant_count,
                    tally,
                }
            })
            .collect();
        ranked.sort_by(compare);
        ranked
    }

    pub fn statistics(&self, family_size: usize) -> VotingStatistics {
        let mut distribution = VoteDistribution::default();
        let mut voters = HashSet::new();
        let mut total_candidates = 0;

        for candidate in self.open_candidates() {
            total_candidates += 1;
            for vote in self.votes.get(&candidate.id).into_iter().flat_map(|v| v.values()) {
                match vote.value {
                    VoteValue::Favor => distribution.favor += 1,
                    VoteValue::Disfavor => distribution.disfavor += 1,
                }
                voters.insert(vote.member_id);
            }
        }

        let total_votes = distribution.favor + distribution.disfavor;
        let average_votes_per_candidate = if total_candidates > 0 {
            f64::from(total_votes) / total_candidates as f64
        } else {
            0.0
        };
        let possible = total_candidates * family_size;
        let participation_rate = if possible > 0 {
            f64::from(total_votes) / possible as f64
        } else {
            0.0
        };

        VotingStatistics {
            total_candidates,
            total_votes,
            family_size,
            distribution,
            distinct_voters: voters.len(),
            average_votes_per_candidate,
            participation_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use famtrip_common::models::{ActivityCategory, VoteChoice};
    use famtrip_common::{MemberId, TripId};

    fn engine_with(count: usize) -> (VotingEngine, Vec<ActivityCandidate>) {
        let trip = TripId::new();
        let base = Utc::now();
        let candidates: Vec<ActivityCandidate> = (0..count)
            .map(|i| {
                ActivityCandidate::new(trip, format!("Candidate {i}"), ActivityCategory::Food)
                    .created_at(base + Duration::seconds(i as i64))
            })
            .collect();
        let engine = VotingEngine::from_parts(trip, candidates.clone(), Vec::new());
        (engine, candidates)
    }

    fn vote(engine: &mut VotingEngine, candidate: &ActivityCandidate, choice: VoteChoice) {
        engine
            .cast_vote(candidate.id, MemberId::new(), choice)
            .unwrap();
    }

    #[test]
    fn test_rank_by_score() {
        let (mut engine, c) = engine_with(2);
        vote(&mut engine, &c[1], VoteChoice::Favor);

        let ranked = engine.rank();
        assert_eq!(ranked[0].candidate.id, c[1].id);
        assert_eq!(ranked[0].score, 1);
    }

    #[test]
    fn test_tie_broken_by_participation_then_age() {
        let (mut engine, c) = engine_with(3);
        // c[0]: no votes, score 0
        // c[1]: +1 -1, score 0 with two participants
        // c[2]: no votes, score 0, newer than c[0]
        vote(&mut engine, &c[1], VoteChoice::Favor);
        vote(&mut engine, &c[1], VoteChoice::Disfavor);

        let order: Vec<_> = engine.rank().into_iter().map(|r| r.candidate.id).collect();
        assert_eq!(order, vec![c[1].id, c[0].id, c[2].id]);
    }

    #[test]
    fn test_rank_is_repeatable() {
        let (mut engine, c) = engine_with(5);
        vote(&mut engine, &c[3], VoteChoice::Favor);
        vote(&mut engine, &c[4], VoteChoice::Favor);
        assert_eq!(engine.rank(), engine.rank());
    }

    #[test]
    fn test_statistics() {
        let (mut engine, c) = engine_with(2);
        let member = MemberId::new();
        engine.cast_vote(c[0].id, member, VoteChoice::Favor).unwrap();
        engine.cast_vote(c[1].id, member, VoteChoice::Disfavor).unwrap();
        vote(&mut engine, &c[0], VoteChoice::Favor);

        let stats = engine.statistics(4);
        assert_eq!(stats.total_candidates, 2);
        assert_eq!(stats.total_votes, 3);
        assert_eq!(stats.distribution, VoteDistribution { favor: 2, disfavor: 1 });
        assert_eq!(stats.distinct_voters, 2);
        assert_eq!(stats.average_votes_per_candidate, 1.5);
        assert_eq!(stats.participation_rate, 3.0 / 8.0);
    }

    #[test]
    fn test_statistics_without_family_is_zero() {
        let (engine, _) = engine_with(1);
        let stats = engine.statistics(0);
        assert_eq!(stats.participation_rate, 0.0);
        assert_eq!(stats.average_votes_per_candidate, 0.0);
    }
}
