//! Family member votes and tallies

use crate::ids::{CandidateId, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Persisted vote value; "neutral" is never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    Favor,
    Disfavor,
}

/// Vote as cast by a member; `Neutral` withdraws any live vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Favor,
    Disfavor,
    Neutral,
}

impl VoteChoice {
    /// Value to store, or `None` when the vote should be removed
    pub fn stored_value(self) -> Option<VoteValue> {
        match self {
            VoteChoice::Favor => Some(VoteValue::Favor),
            VoteChoice::Disfavor => Some(VoteValue::Disfavor),
            VoteChoice::Neutral => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized vote value '{0}' (expected favor, disfavor or neutral)")]
pub struct ParseVoteError(pub String);

impl FromStr for VoteChoice {
    type Err = ParseVoteError;

    /// Accepts `positive`/`negative` as synonyms for favor/disfavor
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "favor" | "positive" => Ok(VoteChoice::Favor),
            "disfavor" | "negative" => Ok(VoteChoice::Disfavor),
            "neutral" => Ok(VoteChoice::Neutral),
            _ => Err(ParseVoteError(s.to_string())),
        }
    }
}

/// One member's live opinion on one candidate, keyed by (candidate, member)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub candidate_id: CandidateId,
    pub member_id: MemberId,
    pub value: VoteValue,
    pub cast_at: DateTime<Utc>,
}

/// Vote counts for one candidate, always recomputed from live votes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub favor_count: u32,
    pub disfavor_count: u32,
    pub participant_count: u32,
}

impl Tally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        votes.into_iter().fold(Self::default(), |mut tally, vote| {
            match vote.value {
                VoteValue::Favor => tally.favor_count += 1,
                VoteValue::Disfavor => tally.disfavor_count += 1,
            }
            tally.participant_count += 1;
            tally
        })
    }

    pub fn score(&self) -> i64 {
        i64::from(self.favor_count) - i64::from(self.disfavor_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(value: VoteValue) -> Vote {
        Vote {
            candidate_id: CandidateId::new(),
            member_id: MemberId::new(),
            value,
            cast_at: Utc::now(),
        }
    }

    #[test]
    fn test_choice_parsing_accepts_synonyms() {
        assert_eq!("favor".parse::<VoteChoice>().unwrap(), VoteChoice::Favor);
        assert_eq!("Positive".parse::<VoteChoice>().unwrap(), VoteChoice::Favor);
        assert_eq!("negative".parse::<VoteChoice>().unwrap(), VoteChoice::Disfavor);
        assert_eq!("neutral".parse::<VoteChoice>().unwrap(), VoteChoice::Neutral);
        assert!("meh".parse::<VoteChoice>().is_err());
    }

    #[test]
    fn test_neutral_is_not_stored() {
        assert_eq!(VoteChoice::Neutral.stored_value(), None);
        assert_eq!(VoteChoice::Disfavor.stored_value(), Some(VoteValue::Disfavor));
    }

    #[test]
    fn test_tally_from_votes() {
        let votes = vec![
            vote(VoteValue::Favor),
            vote(VoteValue::Favor),
            vote(VoteValue::Disfavor),
        ];
        let tally = Tally::from_votes(&votes);
        assert_eq!(
            tally,
            Tally {
                favor_count: 2,
                disfavor_count: 1,
                participant_count: 3
            }
        );
        assert_eq!(tally.score(), 1);
    }

    #[test]
    fn test_empty_tally_scores_zero() {
        assert_eq!(Tally::from_votes(&[]).score(), 0);
    }
}
