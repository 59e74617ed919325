//! # Family Trip Planner Library (famtrip-planner)
//!
//! Shared-state planning core for a family trip.
//!
//! **Purpose:** Distribute activities into per-day time slots, let family
//! members vote on candidate activities and promote the winners into the
//! schedule, and enrich activities with coordinates and weather without
//! breaking third-party rate limits.
//!
//! **Architecture:** [`PlanningCoordinator`] is the façade. It owns one
//! in-memory plan per trip ([`SchedulingEngine`] + [`VotingEngine`]), writes
//! through an [`EntityStore`], and backfills coordinates through a shared
//! [`EnrichmentCache`].

pub mod coordinator;
pub mod enrichment;
pub mod error;
pub mod schedule;
pub mod store;
pub mod voting;

pub use coordinator::{Placement, PlanningCoordinator};
pub use enrichment::{CoordinateLookup, EnrichmentCache, EnrichmentConfig, WeatherLookup};
pub use error::{ErrorKind, PlanningError, PlanningResult};
pub use schedule::{DailySummary, SchedulingEngine, SlotConflict, TripOverview};
pub use store::{EntityStore, InMemoryStore, StoreError};
pub use voting::{RankedCandidate, VotingEngine, VotingStatistics};
