//! Configuration management for Spotledger
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The loaded `Config` is passed explicitly
//! into every component; nothing reads it from global state.

use crate::error::{LedgerError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Retry and timeout policy shared by both upstream providers
    pub fetch: FetchConfig,

    /// Consumption data provider
    pub consumption: ConsumptionConfig,

    /// Spot price provider
    pub prices: PriceConfig,

    /// Per-year dataset cache
    pub cache: CacheConfig,

    /// User preferences
    pub settings: UserSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Resilient fetch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts per request, including the first
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every following retry
    pub base_delay_secs: u64,

    /// Per-attempt HTTP timeout
    pub request_timeout_secs: u64,

    /// User-Agent header sent upstream
    pub user_agent: String,
}

/// Consumption provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionConfig {
    /// Base URL of the metering API
    pub base_url: String,

    /// IANA zone used for readings that carry no UTC offset
    pub timezone: String,
}

/// Price provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Base URL of the spot price API
    pub base_url: String,

    /// VAT applied to every raw price, in percent
    pub markup_percent: f64,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one JSON blob per year
    pub directory: String,

    /// IANA zone defining the calendar day for staleness checks
    pub timezone: String,
}

/// User preferences that used to live in a process-wide settings cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Year to show; `None` means the current year
    pub year: Option<i32>,

    /// Retailer margin added on top of the VAT-inclusive spot price (c/kWh)
    pub margin_cents_per_kwh: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/spotledger.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 1,
            request_timeout_secs: 30,
            user_agent: format!("spotledger/{}", env!("APP_VERSION")),
        }
    }
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://metering.example.invalid/api".to_string(),
            timezone: "Europe/Helsinki".to_string(),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://spot-prices.example.invalid/api".to_string(),
            markup_percent: 25.5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: "spotledger-cache".to_string(),
            timezone: "Europe/Helsinki".to_string(),
        }
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            year: None,
            margin_cents_per_kwh: 0.0,
        }
    }
}

impl ConsumptionConfig {
    /// Parsed source zone for offset-less readings
    pub fn tz(&self) -> Result<Tz> {
        parse_tz("consumption.timezone", &self.timezone)
    }
}

impl CacheConfig {
    /// Parsed zone for calendar-day comparisons
    pub fn tz(&self) -> Result<Tz> {
        parse_tz("cache.timezone", &self.timezone)
    }
}

fn parse_tz(field: &str, name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| {
        LedgerError::validation(field.to_string(), format!("Unknown timezone '{}'", name))
    })
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = ["spotledger.yaml", "/etc/spotledger/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_retries == 0 {
            return Err(LedgerError::validation(
                "fetch.max_retries",
                "Must be at least 1",
            ));
        }

        if self.fetch.request_timeout_secs == 0 {
            return Err(LedgerError::validation(
                "fetch.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.consumption.base_url.trim().is_empty() {
            return Err(LedgerError::validation(
                "consumption.base_url",
                "URL cannot be empty",
            ));
        }

        if self.prices.base_url.trim().is_empty() {
            return Err(LedgerError::validation(
                "prices.base_url",
                "URL cannot be empty",
            ));
        }

        if !self.prices.markup_percent.is_finite() || self.prices.markup_percent <= -100.0 {
            return Err(LedgerError::validation(
                "prices.markup_percent",
                "Must be a finite percentage above -100",
            ));
        }

        if !self.settings.margin_cents_per_kwh.is_finite() {
            return Err(LedgerError::validation(
                "settings.margin_cents_per_kwh",
                "Must be finite",
            ));
        }

        if self.cache.directory.trim().is_empty() {
            return Err(LedgerError::validation(
                "cache.directory",
                "Directory cannot be empty",
            ));
        }

        self.consumption.tz()?;
        self.cache.tz()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.base_delay_secs, 1);
        assert!((config.prices.markup_percent - 25.5).abs() < 1e-9);
        assert_eq!(config.consumption.tz().unwrap(), chrono_tz::Europe::Helsinki);
        assert!(config.settings.year.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.fetch.max_retries = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.cache.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.prices.markup_percent = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "prices:\n  markup_percent: 24.0\nsettings:\n  year: 2023\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!((config.prices.markup_percent - 24.0).abs() < 1e-9);
        assert_eq!(config.prices.base_url, PriceConfig::default().base_url);
        assert_eq!(config.settings.year, Some(2023));
        assert_eq!(config.fetch.max_retries, 5);
    }
}
