//! Activity records and their schedule slot

use crate::ids::{ActivityId, TripId};
use crate::models::geo::Coordinates;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Time of day an activity can be scheduled into
///
/// Declaration order is chronological; `Ord` relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time slot string outside the recognized set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized time slot '{0}' (expected morning, afternoon or evening)")]
pub struct ParseTimeSlotError(pub String);

impl FromStr for TimeSlot {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(TimeSlot::Morning),
            "afternoon" => Ok(TimeSlot::Afternoon),
            "evening" => Ok(TimeSlot::Evening),
            _ => Err(ParseTimeSlotError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Sightseeing,
    Food,
    Shopping,
    Rest,
    Transportation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    MustDo,
    #[default]
    WouldLike,
    Optional,
}

/// Schedule bucket key: one date, one time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

impl ScheduleSlot {
    pub fn new(date: NaiveDate, time_slot: TimeSlot) -> Self {
        Self { date, time_slot }
    }
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time_slot)
    }
}

/// Where a scheduled activity sits: its bucket and its position inside it
///
/// Date and time slot live together here, so an activity can never hold one
/// without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    #[serde(flatten)]
    pub slot: ScheduleSlot,
    /// Zero-based order within the bucket
    pub position: u32,
}

/// Where an activity or candidate takes place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Venue name, also used as a geocoding fallback
    pub name: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Location {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn has_address(&self) -> bool {
        non_blank(self.address.as_deref()).is_some()
    }

    /// A non-blank address or venue name to geocode
    pub fn is_geocodable(&self) -> bool {
        self.has_address() || non_blank(self.name.as_deref()).is_some()
    }

    /// Lookup strings in the order they should be tried: address, then venue name
    pub fn geocoding_queries(&self) -> Vec<String> {
        [self.address.as_deref(), self.name.as_deref()]
            .into_iter()
            .filter_map(non_blank)
            .map(str::to_string)
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// A single plannable item on a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub trip_id: TripId,
    pub name: String,
    pub description: Option<String>,
    pub category: ActivityCategory,
    pub priority: Priority,
    /// Non-negative estimated cost; missing counts as zero in aggregates
    pub estimated_cost: Option<f64>,
    pub location: Location,
    /// `None` while unscheduled
    pub schedule: Option<SlotAssignment>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// New unscheduled activity with default priority
    pub fn new(trip_id: TripId, name: impl Into<String>, category: ActivityCategory) -> Self {
        Self {
            id: ActivityId::new(),
            trip_id,
            name: name.into(),
            description: None,
            category,
            priority: Priority::default(),
            estimated_cost: None,
            location: Location::default(),
            schedule: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost.max(0.0));
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn slot(&self) -> Option<ScheduleSlot> {
        self.schedule.map(|s| s.slot)
    }

    /// Estimated cost with missing or negative values treated as zero
    pub fn cost(&self) -> f64 {
        self.estimated_cost.unwrap_or(0.0).max(0.0)
    }

    /// True when the activity has something to geocode but no coordinates yet
    pub fn needs_coordinates(&self) -> bool {
        self.location.coordinates.is_none() && self.location.is_geocodable()
    }
}
