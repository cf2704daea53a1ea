//! Model configuration parsing from environment variables.
//!
//! `MODEL_PROFILE` picks a preset; the remaining `MODEL_*` variables override single
//! training options of that preset.

use super::{Lookup, parse_optional};
use crate::domain::ml::{ModelProfile, ModelSpec};
use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub profile: ModelProfile,
    pub spec: ModelSpec,
}

impl ModelEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let profile_str = lookup("MODEL_PROFILE").unwrap_or_else(|| "daily".to_string());
        let profile = ModelProfile::from_str(profile_str.trim())?;
        let mut spec = profile.spec();

        if let Some(epochs) = parse_optional::<usize>(lookup, "MODEL_EPOCHS")? {
            spec = spec.with_epochs(epochs);
        }
        if let Some(batch_size) = parse_optional::<usize>(lookup, "MODEL_BATCH_SIZE")? {
            spec = spec.with_batch_size(batch_size);
        }
        if let Some(learning_rate) = parse_optional::<f64>(lookup, "MODEL_LEARNING_RATE")? {
            spec = spec.with_learning_rate(learning_rate);
        }
        if let Some(shuffle) = parse_optional::<bool>(lookup, "MODEL_SHUFFLE")? {
            spec = spec.with_shuffle(shuffle);
        }
        if let Some(raw) = lookup("MODEL_VALIDATION_SPLIT") {
            spec = spec.with_validation_split(parse_split(&raw)?);
        }
        if let Some(seed) = parse_optional::<u64>(lookup, "MODEL_SEED")? {
            spec = spec.with_seed(Some(seed));
        }

        spec.validate()
            .map_err(|e| anyhow::anyhow!("Invalid model config: {}", e))?;

        Ok(Self { profile, spec })
    }
}

/// `none`, empty or `0` disable the validation split.
fn parse_split(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let split = raw
        .parse::<f64>()
        .context("Failed to parse MODEL_VALIDATION_SPLIT")?;
    Ok((split != 0.0).then_some(split))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults_to_daily() {
        let config = ModelEnvConfig::from_lookup(&|_| None).unwrap();
        assert_eq!(config.profile, ModelProfile::Daily);
        assert_eq!(config.spec, ModelSpec::daily());
    }

    #[test]
    fn test_parse_split() {
        assert_eq!(parse_split("none").unwrap(), None);
        assert_eq!(parse_split("0").unwrap(), None);
        assert_eq!(parse_split(" 0.25 ").unwrap(), Some(0.25));
        assert!(parse_split("a lot").is_err());
    }
}
