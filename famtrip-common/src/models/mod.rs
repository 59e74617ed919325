//! Entity model shared by the planner engines and the entity store
//!
//! The store collaborator owns durability; these types are what it loads and
//! saves. Schedule fields are grouped into a single [`SlotAssignment`] so an
//! activity is either fully scheduled or not scheduled at all.

mod activity;
mod candidate;
mod geo;
mod vote;

pub use activity::{
    Activity, ActivityCategory, Location, ParseTimeSlotError, Priority, ScheduleSlot,
    SlotAssignment, TimeSlot,
};
pub use candidate::{ActivityCandidate, Promotion};
pub use geo::{Coordinates, DailyForecast, WeatherSnapshot};
pub use vote::{ParseVoteError, Tally, Vote, VoteChoice, VoteValue};
