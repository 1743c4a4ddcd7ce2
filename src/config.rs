//! Configuration types.
//!
//! `ShipConfig` deserializes from JSON with every section defaulted, so a
//! partial document only overrides the keys it names.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::orders::model::Address;
use crate::rules::model::{DetectionRule, RuleSet};

/// Carrier/service defaults applied to every shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefaults {
    pub carrier: String,
    /// Service for letters when the matching rule names none.
    pub service: String,
    /// Service for packages when the matching rule names none.
    pub package_service: String,
    pub label_format: String,
    /// Country assumed when an export row leaves it blank.
    pub country: String,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            carrier: "USPS".to_string(),
            service: "First".to_string(),
            package_service: "GroundAdvantage".to_string(),
            label_format: "PNG".to_string(),
            country: "US".to_string(),
        }
    }
}

/// Label purchase tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseConfig {
    /// Maximum purchase calls in flight at once.
    pub max_concurrency: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl PurchaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_secs: 45,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipConfig {
    pub defaults: ServiceDefaults,
    pub from_address: Address,
    pub rules: RuleSet,
    pub detection: DetectionRule,
    pub purchase: PurchaseConfig,
}

impl ShipConfig {
    /// Parse a JSON document, filling anything it omits with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Build from the environment:
    /// - `SHIP_CONFIG_PATH`: JSON config file (defaults when unset)
    /// - `SHIP_MAX_CONCURRENCY`: overrides `purchase.max_concurrency`
    /// - `SHIP_PURCHASE_TIMEOUT_SECS`: overrides `purchase.timeout_secs`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("SHIP_CONFIG_PATH") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Some(n) = env_parse::<usize>("SHIP_MAX_CONCURRENCY")? {
            config.purchase.max_concurrency = n;
        }
        if let Some(secs) = env_parse::<u64>("SHIP_PURCHASE_TIMEOUT_SECS")? {
            config.purchase.timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.purchase.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "purchase.max_concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.defaults.service.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "defaults.service".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
