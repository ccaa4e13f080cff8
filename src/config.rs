//! Configuration management

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prefix for environment overrides, e.g. `CIRCUITBREAKER_HEALTH__WINDOW_SIZE_SECONDS`
pub const ENV_PREFIX: &str = "CIRCUITBREAKER_";

/// Complete settings for one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Name used in log fields and metric labels
    pub name: String,
    /// State machine configuration
    pub breaker: BreakerConfig,
    /// Metric window configuration
    pub health: HealthConfig,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            breaker: BreakerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Breaker state machine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// How long an open circuit waits before letting a probe through
    pub sleep_window_millis: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            sleep_window_millis: 5_000,
        }
    }
}

/// Metric window configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds of outcomes kept for health evaluation
    pub window_size_seconds: i64,
    /// Failure rate at or above which the window is unhealthy, in `[0, 1]`
    pub error_rate_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size_seconds: 10,
            error_rate_threshold: 0.5,
        }
    }
}

impl BreakerSettings {
    /// Load settings from an optional YAML file plus `CIRCUITBREAKER_*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let settings: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML string, without environment overrides
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Self = Figment::new()
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.breaker.sleep_window_millis < 0 {
            return Err(Error::Config(format!(
                "breaker.sleep_window_millis must not be negative, got {}",
                self.breaker.sleep_window_millis
            )));
        }
        if self.health.window_size_seconds <= 0 {
            return Err(Error::Config(format!(
                "health.window_size_seconds must be positive, got {}",
                self.health.window_size_seconds
            )));
        }
        let threshold = self.health.error_rate_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "health.error_rate_threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(())
    }
}
