//! Market data provider configuration parsing from environment variables.

use super::{Lookup, parse_or};
use anyhow::Result;

pub const DEFAULT_ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co";
pub const DEFAULT_HISTORY_DAYS: usize = 30;

#[derive(Debug, Clone)]
pub struct ProviderEnvConfig {
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_base_url: String,
    /// Trading days requested per prediction
    pub history_days: usize,
}

impl ProviderEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            alpha_vantage_api_key: lookup("ALPHA_VANTAGE_API_KEY").unwrap_or_default(),
            alpha_vantage_base_url: lookup("ALPHA_VANTAGE_BASE_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_URL.to_string()),
            history_days: parse_or(lookup, "HISTORY_DAYS", DEFAULT_HISTORY_DAYS)?,
        })
    }
}
