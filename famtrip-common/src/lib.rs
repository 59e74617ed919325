//! # famtrip Common Library
//!
//! Shared code for the family trip planner crates:
//! - Entity model (activities, candidates, votes, coordinates, weather)
//! - Typed identifiers
//! - Planner event types and the EventBus
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;

pub use error::{Error, Result};
pub use ids::{ActivityId, CandidateId, MemberId, TripId};
