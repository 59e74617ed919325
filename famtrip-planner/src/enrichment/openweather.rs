//! OpenWeatherMap weather provider
//!
//! API Documentation: https://openweathermap.org/current and
//! https://openweathermap.org/forecast5
//!
//! The 3-hour forecast list is folded into one entry per local date.

use crate::enrichment::providers::{ProviderError, WeatherProvider};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use famtrip_common::models::{Coordinates, DailyForecast, WeatherSnapshot};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Free tier forecasts cover 5 days
pub const MAX_FORECAST_DAYS: u8 = 5;

/// Forecast entries per day (one every 3 hours)
const ENTRIES_PER_DAY: u32 = 8;

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: CurrentMain,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct Condition {
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
    #[serde(default)]
    city: Option<ForecastCity>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    /// Unix timestamp (UTC)
    dt: i64,
    main: ForecastMain,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastCity {
    /// Offset from UTC in seconds
    #[serde(default)]
    timezone: i32,
}

pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    forecast_days: u8,
}

impl OpenWeatherClient {
    /// Build a client; a missing API key makes every lookup fail with
    /// `NotConfigured`
    pub fn new(
        api_key: Option<String>,
        forecast_days: u8,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: OPENWEATHER_BASE_URL.to_string(),
            api_key,
            forecast_days: forecast_days.min(MAX_FORECAST_DAYS),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        coordinates: Coordinates,
        api_key: &str,
        extra: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut params = vec![
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ];
        params.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn lookup(&self, coordinates: Coordinates) -> Result<WeatherSnapshot, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("OpenWeatherMap API key".to_string()))?;

        let count = (u32::from(self.forecast_days) * ENTRIES_PER_DAY).to_string();
        let forecast_params = [("cnt", count)];
        let (current, forecast) = tokio::join!(
            self.get_json::<CurrentResponse>("weather", coordinates, api_key, &[]),
            self.get_json::<ForecastResponse>("forecast", coordinates, api_key, &forecast_params),
        );

        let current = current?;
        let forecast_days = match forecast {
            Ok(forecast) => daily_forecasts(&forecast, self.forecast_days),
            Err(e) => {
                tracing::warn!(error = %e, "Forecast unavailable, returning current conditions only");
                Vec::new()
            }
        };

        Ok(snapshot_from(current, forecast_days))
    }
}

fn snapshot_from(current: CurrentResponse, forecast_days: Vec<DailyForecast>) -> WeatherSnapshot {
    let condition = current.weather.into_iter().next();
    WeatherSnapshot {
        temperature: current.main.temp.round() as i32,
        feels_like: current.main.feels_like.round() as i32,
        humidity: current.main.humidity.round().clamp(0.0, 100.0) as u8,
        condition: condition.as_ref().map(|c| c.main.clone()).unwrap_or_default(),
        description: condition
            .map(|c| title_case(&c.description))
            .unwrap_or_default(),
        forecast_days,
    }
}

/// Fold 3-hour forecast entries into one summary per local date
///
/// Entries are assumed chronological, as the API returns them. A list that
/// starts partway through a day spills into one extra date, so at most
/// `max_days` summaries are kept.
fn daily_forecasts(forecast: &ForecastResponse, max_days: u8) -> Vec<DailyForecast> {
    let offset_secs = forecast.city.as_ref().map_or(0, |c| c.timezone);
    let Some(offset) = FixedOffset::east_opt(offset_secs) else {
        return Vec::new();
    };

    let mut days: Vec<DayAccumulator> = Vec::new();
    for entry in &forecast.list {
        let Some(date) = DateTime::from_timestamp(entry.dt, 0)
            .map(|utc| utc.with_timezone(&offset).date_naive())
        else {
            continue;
        };

        match days.last_mut() {
            Some(day) if day.date == date => day.add(entry),
            _ => {
                let mut day = DayAccumulator::new(date);
                day.add(entry);
                days.push(day);
            }
        }
    }

    days.into_iter()
        .take(usize::from(max_days))
        .map(DayAccumulator::finish)
        .collect()
}

struct DayAccumulator {
    date: NaiveDate,
    min: f64,
    max: f64,
    /// (condition, count) in first-seen order
    conditions: Vec<(String, usize)>,
}

impl DayAccumulator {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            conditions: Vec::new(),
        }
    }

    fn add(&mut self, entry: &ForecastEntry) {
        self.min = self.min.min(entry.main.temp_min);
        self.max = self.max.max(entry.main.temp_max);
        if let Some(condition) = entry.weather.first() {
            match self.conditions.iter_mut().find(|(c, _)| *c == condition.main) {
                Some((_, count)) => *count += 1,
                None => self.conditions.push((condition.main.clone(), 1)),
            }
        }
    }

    fn finish(self) -> DailyForecast {
        // Most frequent condition; earliest wins ties
        let mut best: Option<&(String, usize)> = None;
        for entry in &self.conditions {
            if best.map_or(true, |b| entry.1 > b.1) {
                best = Some(entry);
            }
        }

        DailyForecast {
            date: self.date,
            min_temp: self.min.round() as i32,
            max_temp: self.max.round() as i32,
            condition: best.map(|(c, _)| c.clone()).unwrap_or_default(),
        }
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
