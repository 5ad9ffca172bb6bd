//! Configuration module
//!
//! Reads the TOML config file (~/.config/parking-service/config.toml by
//! default). Every section falls back to its defaults when absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SlotType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Longest hold a reservation may be configured for (7 days)
pub const MAX_RESERVATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default config location
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parking-service")
        .join("config.toml")
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub reservations: ReservationConfig,
    pub expiry: ExpiryConfig,
    pub scan: ScanConfig,
    pub pricing: PricingConfig,
    pub metrics: MetricsConfig,
    /// Slot inventory registered at startup
    pub slots: Vec<SlotSeed>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reservations;
        if r.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "reservations.default_ttl_secs must be positive".into(),
            ));
        }
        if r.max_ttl_secs < r.default_ttl_secs {
            return Err(ConfigError::Invalid(
                "reservations.max_ttl_secs must be >= default_ttl_secs".into(),
            ));
        }
        if r.max_ttl_secs > MAX_RESERVATION_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "reservations.max_ttl_secs must be <= {}",
                MAX_RESERVATION_TTL_SECS
            )));
        }
        if r.reminder_before_secs > r.max_ttl_secs {
            return Err(ConfigError::Invalid(
                "reservations.reminder_before_secs must be <= max_ttl_secs".into(),
            ));
        }
        if self.scan.qr_prefix.is_empty() || self.scan.nfc_prefix.is_empty() {
            return Err(ConfigError::Invalid("scan prefixes must not be empty".into()));
        }
        if self.scan.qr_prefix.starts_with(&self.scan.nfc_prefix)
            || self.scan.nfc_prefix.starts_with(&self.scan.qr_prefix)
        {
            return Err(ConfigError::Invalid(
                "scan prefixes must not be prefixes of each other".into(),
            ));
        }
        if let Some(rate) = self.pricing.hourly_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ConfigError::Invalid("pricing.hourly_rate must be >= 0".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "parking-service".to_string(),
            shutdown_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Hold duration when the caller does not ask for one (15 minutes)
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    /// Send an "expiring" reminder this long before the deadline; 0 disables
    pub reminder_before_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 15 * 60,
            max_ttl_secs: 2 * 60 * 60,
            reminder_before_secs: 2 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Periodic sweep interval; 0 disables the background task
    pub sweep_interval_secs: u64,
    /// Expire lapsed reservations when a read or transition touches them
    pub expire_on_access: bool,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 5,
            expire_on_access: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub qr_prefix: String,
    pub nfc_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            qr_prefix: "PARKING_SLOT_".to_string(),
            nfc_prefix: "NFC_PARKING_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Price per hour of occupancy; sessions are not priced when unset
    pub hourly_rate: Option<f64>,
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            hourly_rate: None,
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

/// One `[[slots]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSeed {
    pub number: String,
    #[serde(default, rename = "type")]
    pub slot_type: SlotType,
    pub floor: Option<i32>,
    pub section: Option<String>,
    pub row: Option<String>,
}
