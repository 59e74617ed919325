//! Best-effort enrichment of activities with coordinates and weather
//!
//! The EnrichmentCache fronts the two external lookups with:
//! - a per-key cache (coordinates never expire once resolved, weather
//!   expires after its TTL, failures expire after a short negative TTL)
//! - single-flight coalescing of identical concurrent lookups
//! - one process-wide token bucket per external service
//! - a bounded timeout on every external call
//!
//! Provider failures never reach the caller; they surface as
//! [`CoordinateLookup::Unresolved`] or [`WeatherLookup::Unavailable`].

pub mod clock;
pub mod nominatim;
pub mod openweather;
pub mod providers;
pub mod rate_limit;
pub mod single_flight;

use clock::{Clock, SystemClock};
use famtrip_common::config::EnrichmentSettings;
use famtrip_common::models::{Coordinates, WeatherSnapshot};
use nominatim::NominatimResolver;
use openweather::OpenWeatherClient;
use providers::{AddressResolver, ProviderError, WeatherProvider};
use rate_limit::ServiceLimiter;
use serde::Serialize;
use single_flight::SingleFlight;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Client-side timeout of the HTTP adapters
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime enrichment limits, converted from [`EnrichmentSettings`]
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub geocode_rate: NonZeroU32,
    pub geocode_burst: NonZeroU32,
    pub weather_per_minute: NonZeroU32,
    pub weather_ttl: Duration,
    pub negative_ttl: Duration,
    pub lookup_timeout: Duration,
    pub rate_limit_wait: Duration,
    pub coordinate_precision: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self::from(&EnrichmentSettings::default())
    }
}

impl From<&EnrichmentSettings> for EnrichmentConfig {
    fn from(settings: &EnrichmentSettings) -> Self {
        let defaults = EnrichmentSettings::default();
        Self {
            geocode_rate: quota(
                "geocode_requests_per_second",
                settings.geocode_requests_per_second,
                defaults.geocode_requests_per_second,
            ),
            geocode_burst: quota("geocode_burst", settings.geocode_burst, defaults.geocode_burst),
            weather_per_minute: quota(
                "weather_requests_per_minute",
                settings.weather_requests_per_minute,
                defaults.weather_requests_per_minute,
            ),
            weather_ttl: Duration::from_secs(settings.weather_ttl_secs),
            negative_ttl: Duration::from_secs(settings.negative_ttl_secs),
            lookup_timeout: Duration::from_secs(non_zero_or(
                "lookup_timeout_secs",
                settings.lookup_timeout_secs,
                defaults.lookup_timeout_secs,
            )),
            rate_limit_wait: Duration::from_millis(settings.rate_limit_wait_ms),
            coordinate_precision: settings.coordinate_precision.min(6),
        }
    }
}

fn quota(name: &str, value: u32, default: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or_else(|| {
            tracing::warn!(setting = name, default, "Zero quota configured, using default");
            NonZeroU32::new(default)
        })
        .unwrap_or(NonZeroU32::MIN)
}

fn non_zero_or(name: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        tracing::warn!(setting = name, default, "Zero value configured, using default");
        default
    } else {
        value
    }
}

/// Result of [`EnrichmentCache::resolve_coordinates`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "coordinates", rename_all = "snake_case")]
pub enum CoordinateLookup {
    Resolved(Coordinates),
    Unresolved,
}

impl CoordinateLookup {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Self::Resolved(coords) => Some(*coords),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Result of [`EnrichmentCache::resolve_weather`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "weather", rename_all = "snake_case")]
pub enum WeatherLookup {
    Available(WeatherSnapshot),
    Unavailable,
}

impl WeatherLookup {
    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        match self {
            Self::Available(snapshot) => Some(snapshot),
            Self::Unavailable => None,
        }
    }

    pub fn into_snapshot(self) -> Option<WeatherSnapshot> {
        match self {
            Self::Available(snapshot) => Some(snapshot),
            Self::Unavailable => None,
        }
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub external_calls: u64,
    /// Callers that attached to another caller's in-flight lookup
    pub coalesced: u64,
    /// Lookups degraded because no rate-limit token was available in time
    pub rate_limited: u64,
    pub coordinate_entries: usize,
    pub weather_entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    external_calls: AtomicU64,
    coalesced: AtomicU64,
    rate_limited: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cached value; `None` marks a cached failure
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: Option<T>,
    stored_at: Instant,
    /// `None` never expires
    ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.stored_at) >= ttl)
    }
}

type EntryMap<K, T> = Mutex<HashMap<K, CacheEntry<T>>>;
type WeatherKey = (i64, i64);

struct Inner {
    resolver: Arc<dyn AddressResolver>,
    weather: Arc<dyn WeatherProvider>,
    config: EnrichmentConfig,
    clock: Arc<dyn Clock>,
    coordinates: EntryMap<String, Coordinates>,
    forecasts: EntryMap<WeatherKey, WeatherSnapshot>,
    coordinate_flights: SingleFlight<String, CoordinateLookup>,
    weather_flights: SingleFlight<WeatherKey, WeatherLookup>,
    geocode_limiter: ServiceLimiter,
    weather_limiter: ServiceLimiter,
    counters: Counters,
}

/// Shared enrichment front; cheap to clone
#[derive(Clone)]
pub struct EnrichmentCache {
    inner: Arc<Inner>,
}

impl EnrichmentCache {
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        weather: Arc<dyn WeatherProvider>,
        config: EnrichmentConfig,
    ) -> Self {
        Self::with_clock(resolver, weather, config, Arc::new(SystemClock))
    }

    /// Build with an injected clock driving TTL expiry
    pub fn with_clock(
        resolver: Arc<dyn AddressResolver>,
        weather: Arc<dyn WeatherProvider>,
        config: EnrichmentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let geocode_limiter = ServiceLimiter::per_second(
            "geocoding",
            config.geocode_rate,
            config.geocode_burst,
            config.rate_limit_wait,
        );
        let weather_limiter =
            ServiceLimiter::per_minute("weather", config.weather_per_minute, config.rate_limit_wait);

        Self {
            inner: Arc::new(Inner {
                resolver,
                weather,
                config,
                clock,
                coordinates: Mutex::new(HashMap::new()),
                forecasts: Mutex::new(HashMap::new()),
                coordinate_flights: SingleFlight::new(),
                weather_flights: SingleFlight::new(),
                geocode_limiter,
                weather_limiter,
                counters: Counters::default(),
            }),
        }
    }

    /// Compose the cache over Nominatim and OpenWeatherMap
    pub fn http_backed(
        settings: &EnrichmentSettings,
        openweather_api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let resolver = NominatimResolver::new(&settings.user_agent, HTTP_CLIENT_TIMEOUT)?;
        let weather = OpenWeatherClient::new(
            openweather_api_key,
            settings.forecast_days,
            HTTP_CLIENT_TIMEOUT,
        )?;
        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(weather),
            EnrichmentConfig::from(settings),
        ))
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.inner.config
    }

    /// Address → coordinates, or `Unresolved` on any failure
    pub async fn resolve_coordinates(&self, address: &str) -> CoordinateLookup {
        let query = collapse_whitespace(address);
        if query.is_empty() {
            return CoordinateLookup::Unresolved;
        }
        let key = query.to_lowercase();

        if let Some(cached) = self.inner.cached_coordinates(&key) {
            return cached;
        }
        Counters::bump(&self.inner.counters.misses);

        let inner = Arc::clone(&self.inner);
        let flight = self
            .inner
            .coordinate_flights
            .run(key.clone(), async move { inner.fetch_coordinates(key, query).await })
            .await;

        if flight.coalesced {
            Counters::bump(&self.inner.counters.coalesced);
        }
        flight.value.unwrap_or(CoordinateLookup::Unresolved)
    }

    /// Coordinates → weather, or `Unavailable` on any failure
    pub async fn resolve_weather(&self, latitude: f64, longitude: f64) -> WeatherLookup {
        let Some(coordinates) = Coordinates::new(latitude, longitude) else {
            tracing::debug!(latitude, longitude, "Weather requested for implausible coordinates");
            return WeatherLookup::Unavailable;
        };
        let key = coordinates.rounded_key(self.inner.config.coordinate_precision);

        if let Some(cached) = self.inner.cached_weather(&key) {
            return cached;
        }
        Counters::bump(&self.inner.counters.misses);

        let inner = Arc::clone(&self.inner);
        let flight = self
            .inner
            .weather_flights
            .run(key, async move { inner.fetch_weather(key, coordinates).await })
            .await;

        if flight.coalesced {
            Counters::bump(&self.inner.counters.coalesced);
        }
        flight.value.unwrap_or(WeatherLookup::Unavailable)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let removed = purge(&self.inner.coordinates, now) + purge(&self.inner.forecasts, now);
        if removed > 0 {
            tracing::debug!(removed, "Purged expired enrichment entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            external_calls: counters.external_calls.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            coordinate_entries: lock(&self.inner.coordinates).len(),
            weather_entries: lock(&self.inner.forecasts).len(),
        }
    }
}

impl Inner {
    fn cached_coordinates(&self, key: &str) -> Option<CoordinateLookup> {
        let entry = lookup(&self.coordinates, key, self.clock.now())?;
        Counters::bump(&self.counters.hits);
        tracing::debug!(address = %key, negative = entry.is_none(), "Coordinate cache hit");
        Some(entry.map_or(CoordinateLookup::Unresolved, CoordinateLookup::Resolved))
    }

    fn cached_weather(&self, key: &WeatherKey) -> Option<WeatherLookup> {
        let entry = lookup(&self.forecasts, key, self.clock.now())?;
        Counters::bump(&self.counters.hits);
        tracing::debug!(key = ?key, negative = entry.is_none(), "Weather cache hit");
        Some(entry.map_or(WeatherLookup::Unavailable, WeatherLookup::Available))
    }

    async fn fetch_coordinates(&self, key: String, query: String) -> CoordinateLookup {
        // A flight that finished just before this one started may have filled the entry
        if let Some(cached) = self.cached_coordinates(&key) {
            return cached;
        }

        if !self.geocode_limiter.acquire().await {
            Counters::bump(&self.counters.rate_limited);
            tracing::warn!(address = %query, "Geocoding rate limit reached, coordinates unresolved");
            return CoordinateLookup::Unresolved;
        }

        Counters::bump(&self.counters.external_calls);
        let result = match tokio::time::timeout(
            self.config.lookup_timeout,
            self.resolver.lookup(&query),
        )
        .await
        {
            Ok(Ok(coords)) if coords.is_plausible() => Ok(coords),
            Ok(Ok(coords)) => Err(ProviderError::Parse(format!(
                "implausible coordinates ({}, {})",
                coords.latitude, coords.longitude
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Network(format!(
                "timed out after {:?}",
                self.config.lookup_timeout
            ))),
        };

        let now = self.clock.now();
        match result {
            Ok(coords) => {
                tracing::info!(
                    address = %query,
                    latitude = coords.latitude,
                    longitude = coords.longitude,
                    "Address geocoded"
                );
                store(&self.coordinates, key, Some(coords), now, None);
                CoordinateLookup::Resolved(coords)
            }
            Err(e) => {
                tracing::warn!(address = %query, error = %e, "Geocoding failed");
                store(&self.coordinates, key, None, now, Some(self.config.negative_ttl));
                CoordinateLookup::Unresolved
            }
        }
    }

    async fn fetch_weather(&self, key: WeatherKey, coordinates: Coordinates) -> WeatherLookup {
        if let Some(cached) = self.cached_weather(&key) {
            return cached;
        }

        if !self.weather_limiter.acquire().await {
            Counters::bump(&self.counters.rate_limited);
            tracing::warn!(key = ?key, "Weather rate limit reached, weather unavailable");
            return WeatherLookup::Unavailable;
        }

        Counters::bump(&self.counters.external_calls);
        let result =
            match tokio::time::timeout(self.config.lookup_timeout, self.weather.lookup(coordinates))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Network(format!(
                    "timed out after {:?}",
                    self.config.lookup_timeout
                ))),
            };

        let now = self.clock.now();
        match result {
            Ok(snapshot) => {
                tracing::info!(
                    latitude = coordinates.latitude,
                    longitude = coordinates.longitude,
                    condition = %snapshot.condition,
                    "Weather fetched"
                );
                store(
                    &self.forecasts,
                    key,
                    Some(snapshot.clone()),
                    now,
                    Some(self.config.weather_ttl),
                );
                WeatherLookup::Available(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    latitude = coordinates.latitude,
                    longitude = coordinates.longitude,
                    error = %e,
                    "Weather lookup failed"
                );
                store(&self.forecasts, key, None, now, Some(self.config.negative_ttl));
                WeatherLookup::Unavailable
            }
        }
    }
}

fn lock<K, T>(map: &EntryMap<K, T>) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<T>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live entry for `key`: `Some(None)` is a cached failure
fn lookup<K, Q, T>(map: &EntryMap<K, T>, key: &Q, now: Instant) -> Option<Option<T>>
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
    T: Clone,
{
    let entries = lock(map);
    let entry = entries.get(key)?;
    if entry.is_expired(now) {
        return None;
    }
    Some(entry.value.clone())
}

fn store<K: Eq + Hash, T>(
    map: &EntryMap<K, T>,
    key: K,
    value: Option<T>,
    stored_at: Instant,
    ttl: Option<Duration>,
) {
    lock(map).insert(
        key,
        CacheEntry {
            value,
            stored_at,
            ttl,
        },
    );
}

fn purge<K: Eq + Hash, T>(map: &EntryMap<K, T>, now: Instant) -> usize {
    let mut entries = lock(map);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
