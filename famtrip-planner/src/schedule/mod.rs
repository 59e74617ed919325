//! Trip schedule: slot index plus the placement engine

mod engine;
mod index;

pub use engine::{
    DailySummary, PlacementChange, ScheduleError, SchedulingEngine, SlotConflict, TripOverview,
};
pub use index::ScheduleIndex;
