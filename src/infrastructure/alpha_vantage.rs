use crate::domain::errors::MarketDataError;
use crate::domain::market::{PricePoint, PriceSeries};
use crate::domain::ports::PriceHistorySource;
use crate::infrastructure::http_client_factory::HttpClientFactory;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use url::Url;

/// `outputsize=compact` returns this many trading days
const COMPACT_OUTPUT_DAYS: usize = 100;

/// Daily closes from the Alpha Vantage `TIME_SERIES_DAILY` endpoint
pub struct AlphaVantageClient {
    client: ClientWithMiddleware,
    endpoint: Url,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid Alpha Vantage base URL: {}", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("query")
            .context("Failed to build Alpha Vantage query URL")?;

        if api_key.is_empty() {
            warn!("ALPHA_VANTAGE_API_KEY is empty, requests will be rejected by the provider");
        }

        Ok(Self {
            client: HttpClientFactory::create_client(),
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PriceHistorySource for AlphaVantageClient {
    async fn daily_closes(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<PriceSeries, MarketDataError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MarketDataError::InvalidSymbol { symbol });
        }

        let output_size = if days > COMPACT_OUTPUT_DAYS {
            "full"
        } else {
            "compact"
        };
        info!("Fetching {} daily closes for {} from Alpha Vantage", days, symbol);

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("function", "TIME_SERIES_DAILY")
            .append_pair("symbol", &symbol)
            .append_pair("apikey", &self.api_key)
            .append_pair("outputsize", output_size);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarketDataError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(MarketDataError::Transport {
                reason: format!("Alpha Vantage returned HTTP {}", status),
            });
        }

        let body = response.text().await.map_err(|e| MarketDataError::Transport {
            reason: e.to_string(),
        })?;
        parse_daily_series(&body, &symbol, days)
    }

    fn name(&self) -> &str {
        "alpha_vantage"
    }
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: String,
}

/// Turns a `TIME_SERIES_DAILY` payload into the most recent `days` closes, oldest first.
pub fn parse_daily_series(
    body: &str,
    symbol: &str,
    days: usize,
) -> Result<PriceSeries, MarketDataError> {
    let response: DailySeriesResponse =
        serde_json::from_str(body).map_err(|e| MarketDataError::InvalidData {
            symbol: symbol.to_string(),
            reason: format!("unexpected response: {}", e),
        })?;

    if let Some(message) = response.error_message {
        debug!("Alpha Vantage error for {}: {}", symbol, message);
        return Err(MarketDataError::InvalidSymbol {
            symbol: symbol.to_string(),
        });
    }

    let time_series = match response.time_series {
        Some(series) if !series.is_empty() => series,
        _ => {
            if let Some(notice) = response.note.or(response.information) {
                warn!("Alpha Vantage throttled the request: {}", notice);
                return Err(MarketDataError::RateLimitExceeded);
            }
            return Err(MarketDataError::NoData {
                symbol: symbol.to_string(),
            });
        }
    };

    // ISO dates sort chronologically
    let skip = time_series.len().saturating_sub(days);
    let points = time_series
        .iter()
        .skip(skip)
        .map(|(date, bar)| {
            let close: f64 = bar.close.trim().parse().map_err(|_| MarketDataError::InvalidData {
                symbol: symbol.to_string(),
                reason: format!("close '{}' on {} is not a number", bar.close, date),
            })?;
            PricePoint::parse(date, close).map_err(|e| MarketDataError::InvalidData {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    PriceSeries::new(points).map_err(|e| MarketDataError::InvalidData {
        symbol: symbol.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_query_path() {
        let client = AlphaVantageClient::new("https://www.alphavantage.co", "demo".into()).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://www.alphavantage.co/query");

        let proxied = AlphaVantageClient::new("http://localhost:8080/av", "demo".into()).unwrap();
        assert_eq!(proxied.endpoint().as_str(), "http://localhost:8080/av/query");

        assert!(AlphaVantageClient::new("not a url", "demo".into()).is_err());
    }

    #[test]
    fn test_parse_error_message_is_invalid_symbol() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let err = parse_daily_series(body, "NOPE", 30).unwrap_err();
        assert!(matches!(err, MarketDataError::InvalidSymbol { symbol } if symbol == "NOPE"));
    }
}
