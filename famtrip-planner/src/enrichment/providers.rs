//! External lookup contracts
//!
//! The EnrichmentCache is the only caller of these traits; it adds caching,
//! coalescing, rate limiting and timeouts on top.

use async_trait::async_trait;
use famtrip_common::models::{Coordinates, WeatherSnapshot};
use thiserror::Error;

/// External provider errors
///
/// Always absorbed by the EnrichmentCache; callers only ever see a degraded
/// lookup result.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No result for '{0}'")]
    NotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Address → coordinates
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<Coordinates, ProviderError>;
}

/// Coordinates → current weather and short forecast
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn lookup(&self, coordinates: Coordinates) -> Result<WeatherSnapshot, ProviderError>;
}
