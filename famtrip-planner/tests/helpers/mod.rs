//! Test Helper Utilities
//!
//! Shared utilities for testing famtrip-planner

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fakes;
pub mod fixtures;

// Re-export commonly used items
pub use fakes::{FakeResolver, FakeWeather, FlakyStore};
pub use fixtures::{coordinator_with, day, osaka, seed_trip, test_config, SeededTrip};
