//! Activity candidates discovered for family voting

use crate::ids::{ActivityId, CandidateId, TripId};
use crate::models::activity::{ActivityCategory, Location};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a candidate's one-way promotion into the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub activity_id: ActivityId,
    pub promoted_at: DateTime<Utc>,
}

/// A discovered, not-yet-committed activity proposal
///
/// Display fields are denormalized from the discovery source so the
/// resulting activity can be built without another lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCandidate {
    pub id: CandidateId,
    pub trip_id: TripId,
    pub name: String,
    pub description: Option<String>,
    pub category: ActivityCategory,
    pub estimated_cost: Option<f64>,
    pub location: Location,
    /// Creation time; final ranking tie-break
    pub created_at: DateTime<Utc>,
    /// Set exactly once; a promoted candidate is frozen
    pub promotion: Option<Promotion>,
    /// Explicitly removed from consideration
    #[serde(default)]
    pub archived: bool,
}

impl ActivityCandidate {
    pub fn new(trip_id: TripId, name: impl Into<String>, category: ActivityCategory) -> Self {
        Self {
            id: CandidateId::new(),
            trip_id,
            name: name.into(),
            description: None,
            category,
            estimated_cost: None,
            location: Location::default(),
            created_at: Utc::now(),
            promotion: None,
            archived: false,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost.max(0.0));
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_promoted(&self) -> bool {
        self.promotion.is_some()
    }

    /// Still accepting votes and eligible for ranking
    pub fn is_open(&self) -> bool {
        !self.is_promoted() && !self.archived
    }
}
