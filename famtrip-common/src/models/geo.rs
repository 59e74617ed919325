//! Coordinates and weather payloads produced by enrichment

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting values no geocoder should ever return
    ///
    /// Non-finite values, out-of-range values and the null island (0.0, 0.0)
    /// are treated as malformed.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let coords = Self { latitude, longitude };
        coords.is_plausible().then_some(coords)
    }

    pub fn is_plausible(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Cache key: coordinates scaled by 10^precision and rounded
    pub fn rounded_key(&self, precision: u32) -> (i64, i64) {
        let scale = 10f64.powi(precision as i32);
        (
            (self.latitude * scale).round() as i64,
            (self.longitude * scale).round() as i64,
        )
    }
}

/// One day of an aggregated forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub min_temp: i32,
    pub max_temp: i32,
    /// Most frequent condition reported for the day
    pub condition: String,
}

/// Current conditions plus a short daily forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Degrees Celsius, rounded
    pub temperature: i32,
    pub feels_like: i32,
    pub humidity: u8,
    /// Short condition group, e.g. "Clouds"
    pub condition: String,
    pub description: String,
    pub forecast_days: Vec<DailyForecast>,
}
