use crate::domain::errors::MarketDataError;
use crate::domain::market::PriceSeries;
use crate::domain::ports::PriceHistorySource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// In-memory price history, keyed by upper-case symbol
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    series: Arc<RwLock<HashMap<String, PriceSeries>>>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(symbol: &str, series: PriceSeries) -> Self {
        let mut map = HashMap::new();
        map.insert(symbol.to_uppercase(), series);
        Self {
            series: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, symbol: &str, series: PriceSeries) {
        info!("StaticPriceSource: {} closes for {}", series.len(), symbol);
        self.series.write().await.insert(symbol.to_uppercase(), series);
    }
}

#[async_trait]
impl PriceHistorySource for StaticPriceSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<PriceSeries, MarketDataError> {
        let symbol = symbol.trim().to_uppercase();
        self.series
            .read()
            .await
            .get(&symbol)
            .map(|series| series.most_recent(days))
            .ok_or(MarketDataError::InvalidSymbol { symbol })
    }

    fn name(&self) -> &str {
        "static"
    }
}
