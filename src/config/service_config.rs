//! Request handling configuration parsing from environment variables.

use super::{Lookup, parse_or};
use crate::application::prediction_service::OverlapPolicy;
use anyhow::Result;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceEnvConfig {
    /// `None` when `PREDICTION_TIMEOUT_SECS` is 0 or unset
    pub timeout: Option<Duration>,
    pub overlap_policy: OverlapPolicy,
}

impl ServiceEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let timeout_secs: u64 = parse_or(lookup, "PREDICTION_TIMEOUT_SECS", 0)?;
        let overlap_str = lookup("OVERLAP_POLICY").unwrap_or_else(|| "reject".to_string());

        Ok(Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            overlap_policy: OverlapPolicy::from_str(overlap_str.trim())?,
        })
    }
}
