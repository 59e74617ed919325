//! Bootstrap configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `FAMTRIP_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/famtrip/famtrip.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file never aborts startup: a warning is logged and the compiled
//! defaults are used. A file that exists but fails to parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FAMTRIP_CONFIG";

/// Environment variable overriding the OpenWeatherMap API key
pub const OPENWEATHER_KEY_ENV_VAR: &str = "FAMTRIP_OPENWEATHER_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub enrichment: EnrichmentSettings,

    #[serde(default)]
    pub events: EventSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External lookup limits and cache lifetimes
///
/// Durations are plain integers so the TOML stays readable; the planner
/// converts them into `Duration`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Geocoder quota (Nominatim allows 1 request/second)
    pub geocode_requests_per_second: u32,
    pub geocode_burst: u32,
    pub weather_requests_per_minute: u32,
    pub weather_ttl_secs: u64,
    /// Lifetime of cached failures for both services
    pub negative_ttl_secs: u64,
    pub lookup_timeout_secs: u64,
    /// Longest a caller waits for a rate-limit token before degrading
    pub rate_limit_wait_ms: u64,
    /// Decimal places kept when keying weather by coordinates
    pub coordinate_precision: u32,
    pub forecast_days: u8,
    pub user_agent: String,
    pub openweather_api_key: Option<String>,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            geocode_requests_per_second: 1,
            geocode_burst: 1,
            weather_requests_per_minute: 60,
            weather_ttl_secs: 600,
            negative_ttl_secs: 60,
            lookup_timeout_secs: 5,
            rate_limit_wait_ms: 1500,
            coordinate_precision: 2,
            forecast_days: 5,
            user_agent: "family-trip-planner".to_string(),
            openweather_api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_capacity() -> usize {
    256
}

/// Resolve which config file to read, following the priority order above
///
/// Returns `None` when no candidate file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// `<config_dir>/famtrip/famtrip.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("famtrip").join("famtrip.toml"))
}

/// Read and parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration with graceful fallback to compiled defaults
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(TomlConfig::default());
    }

    let config = read_toml_config(&path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// OpenWeatherMap API key: environment first, then TOML
pub fn resolve_openweather_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(OPENWEATHER_KEY_ENV_VAR).ok();
    let toml_key = config.enrichment.openweather_api_key.clone();

    if let (Some(env), Some(toml)) = (&env_key, &toml_key) {
        if is_valid_key(env) && is_valid_key(toml) && env != toml {
            warn!("OpenWeatherMap API key set in both environment and TOML; using environment");
        }
    }

    env_key
        .filter(|k| is_valid_key(k))
        .or_else(|| toml_key.filter(|k| is_valid_key(k)))
        .map(|k| k.trim().to_string())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.enrichment.weather_ttl_secs, 600);
        assert_eq!(config.enrichment.geocode_requests_per_second, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_enrichment_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [enrichment]
            weather_requests_per_minute = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.enrichment.weather_requests_per_minute, 30);
        assert_eq!(config.enrichment.negative_ttl_secs, 60);
        assert_eq!(config.enrichment.user_agent, "family-trip-planner");
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = PathBuf::from("/tmp/famtrip-cli.toml");
        assert_eq!(resolve_config_path(Some(&path)), Some(path));
    }
}
