use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Upper bound for hour-valued settings (ten years).
pub const MAX_HOURS: u64 = 24 * 365 * 10;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_workers: {0}. Must be between 1 and 100")]
    InvalidMaxWorkers(usize),

    #[error("Invalid claim_attempts: {0}. Must be at least 1")]
    InvalidClaimAttempts(u32),

    #[error("Invalid stall_threshold_hours: {0}. Must be between 1 and {MAX_HOURS}")]
    InvalidStallThreshold(u64),

    #[error("Invalid scoring weight {name}: {value}. Must be non-negative")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("Scoring weights sum to {0}, expected 1.0")]
    InvalidWeightSum(f64),

    #[error("Invalid time_horizon_hours: {0}. Must be between 1 and {MAX_HOURS}")]
    InvalidTimeHorizon(u64),

    #[error("Invalid max_delivery_attempts: {0}. Must be at least 1")]
    InvalidDeliveryAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid webhook_url: {0}. Must be an http(s) URL")]
    InvalidWebhookUrl(String),

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskwarden/config.yaml (project config)
    /// 3. .taskwarden/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TASKWARDEN_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".taskwarden")
    }

    /// Same precedence as [`ConfigLoader::load`], rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("TASKWARDEN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;
        if scheduler.max_workers == 0 || scheduler.max_workers > 100 {
            return Err(ConfigError::InvalidMaxWorkers(scheduler.max_workers));
        }
        if scheduler.claim_attempts == 0 {
            return Err(ConfigError::InvalidClaimAttempts(scheduler.claim_attempts));
        }
        if scheduler.stall_threshold_hours == 0 || scheduler.stall_threshold_hours > MAX_HOURS {
            return Err(ConfigError::InvalidStallThreshold(
                scheduler.stall_threshold_hours,
            ));
        }

        let scoring = &config.scoring;
        let weights = [
            ("dependency_weight", scoring.dependency_weight),
            ("complexity_weight", scoring.complexity_weight),
            ("availability_weight", scoring.availability_weight),
            ("urgency_weight", scoring.urgency_weight),
        ];
        for (name, value) in weights {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }
        let sum = scoring.weight_sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeightSum(sum));
        }
        if scoring.time_horizon_hours == 0 || scoring.time_horizon_hours > MAX_HOURS {
            return Err(ConfigError::InvalidTimeHorizon(scoring.time_horizon_hours));
        }

        let escalation = &config.escalation;
        if escalation.max_delivery_attempts == 0 {
            return Err(ConfigError::InvalidDeliveryAttempts(
                escalation.max_delivery_attempts,
            ));
        }
        if escalation.initial_backoff_ms >= escalation.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                escalation.initial_backoff_ms,
                escalation.max_backoff_ms,
            ));
        }
        if let Some(url) = &escalation.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidWebhookUrl(url.clone()));
            }
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}
