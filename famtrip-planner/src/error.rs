//! Error types for the planner
//!
//! [`PlanningError`] is the only error a coordinator caller ever sees.
//! Enrichment failures are not errors; they degrade to empty results.

use crate::schedule::ScheduleError;
use crate::store::StoreError;
use crate::voting::VoteError;
use famtrip_common::models::{ParseTimeSlotError, ParseVoteError};
use famtrip_common::{ActivityId, CandidateId};
use serde::Serialize;
use thiserror::Error;

/// Broad class of a [`PlanningError`], for mapping to transport status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller input outside the recognized values; nothing was changed
    Validation,
    /// Referenced ID is not part of the trip
    Reference,
    /// Not allowed in the entity's current lifecycle state; never retry
    StateConflict,
    /// Durability layer failed; the in-memory state was rolled back
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("Invalid time slot: {0}")]
    InvalidSlot(String),

    #[error("Invalid vote value: {0}")]
    InvalidVoteValue(String),

    #[error("Unknown activity: {0}")]
    UnknownActivity(ActivityId),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(CandidateId),

    #[error("Candidate {0} has been promoted")]
    CandidatePromoted(CandidateId),

    #[error("Candidate {0} was already promoted")]
    AlreadyPromoted(CandidateId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PlanningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanningError::InvalidSlot(_) | PlanningError::InvalidVoteValue(_) => {
                ErrorKind::Validation
            }
            PlanningError::UnknownActivity(_) | PlanningError::CandidateNotFound(_) => {
                ErrorKind::Reference
            }
            PlanningError::CandidatePromoted(_) | PlanningError::AlreadyPromoted(_) => {
                ErrorKind::StateConflict
            }
            PlanningError::Store(_) => ErrorKind::Storage,
        }
    }
}

impl From<ScheduleError> for PlanningError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::UnknownActivity(id) => PlanningError::UnknownActivity(id),
            ScheduleError::TripMismatch { activity_id, .. } => {
                PlanningError::UnknownActivity(activity_id)
            }
        }
    }
}

impl From<VoteError> for PlanningError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::CandidateNotFound(id) => PlanningError::CandidateNotFound(id),
            VoteError::CandidatePromoted(id) => PlanningError::CandidatePromoted(id),
            VoteError::AlreadyPromoted(id) => PlanningError::AlreadyPromoted(id),
            VoteError::Schedule(e) => e.into(),
        }
    }
}

impl From<ParseTimeSlotError> for PlanningError {
    fn from(err: ParseTimeSlotError) -> Self {
        PlanningError::InvalidSlot(err.0)
    }
}

impl From<ParseVoteError> for PlanningError {
    fn from(err: ParseVoteError) -> Self {
        PlanningError::InvalidVoteValue(err.0)
    }
}

/// Result type for coordinator operations
pub type PlanningResult<T> = std::result::Result<T, PlanningError>;
