//! Configuration module for pricecast.
//!
//! Settings come from environment variables (a `.env` file is loaded by the binary), split by
//! concern: Model, Provider and Service. Parsing goes through a lookup function so callers can
//! layer command-line overrides on top of the environment.

mod model_config;
mod provider_config;
mod service_config;

pub use model_config::ModelEnvConfig;
pub use provider_config::ProviderEnvConfig;
pub use service_config::ServiceEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Source of raw configuration values, `None` when a key is unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelEnvConfig,
    pub provider: ProviderEnvConfig,
    pub service: ServiceEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let model = ModelEnvConfig::from_lookup(lookup).context("Failed to load model config")?;
        let provider =
            ProviderEnvConfig::from_lookup(lookup).context("Failed to load provider config")?;
        let service =
            ServiceEnvConfig::from_lookup(lookup).context("Failed to load service config")?;

        let required = model.spec.min_series_len();
        if provider.history_days < required {
            anyhow::bail!(
                "HISTORY_DAYS={} is too short for the {} profile, which needs at least {} days",
                provider.history_days,
                model.profile,
                required
            );
        }

        Ok(Self {
            model,
            provider,
            service,
        })
    }
}

/// Parses `key` when set, otherwise returns `default`.
pub(crate) fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match parse_optional(lookup, key)? {
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

/// Parses `key` when set and non-empty.
pub(crate) fn parse_optional<T>(lookup: Lookup<'_>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Failed to parse {}", key)),
        _ => Ok(None),
    }
}
