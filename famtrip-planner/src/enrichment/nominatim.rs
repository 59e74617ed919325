//! Nominatim (OpenStreetMap) address resolver
//!
//! API Documentation: https://nominatim.org/release-docs/latest/api/Search/
//!
//! Nominatim requires an identifying User-Agent and allows at most one
//! request per second; the limit is enforced by the EnrichmentCache.

use crate::enrichment::providers::{AddressResolver, ProviderError};
use async_trait::async_trait;
use famtrip_common::models::Coordinates;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// One search hit; Nominatim returns coordinates as strings
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

pub struct NominatimResolver {
    client: Client,
    base_url: String,
}

impl NominatimResolver {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: NOMINATIM_BASE_URL.to_string(),
        })
    }

    /// Point at a self-hosted Nominatim instance
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AddressResolver for NominatimResolver {
    async fn lookup(&self, address: &str) -> Result<Coordinates, ProviderError> {
        let url = format!("{}/search", self.base_url);
        tracing::debug!(address = %address, "Querying Nominatim");

        let response = self
            .client
            .get(&url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status(status.as_u16(), body));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        first_place_coordinates(places, address)
    }
}

fn first_place_coordinates(
    places: Vec<NominatimPlace>,
    address: &str,
) -> Result<Coordinates, ProviderError> {
    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::NotFound(address.to_string()))?;

    let latitude: f64 = place
        .lat
        .parse()
        .map_err(|_| ProviderError::Parse(format!("latitude '{}'", place.lat)))?;
    let longitude: f64 = place
        .lon
        .parse()
        .map_err(|_| ProviderError::Parse(format!("longitude '{}'", place.lon)))?;

    tracing::debug!(address = %address, matched = %place.display_name, "Nominatim match");
    Ok(Coordinates {
        latitude,
        longitude,
    })
}
