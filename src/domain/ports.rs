use crate::domain::errors::MarketDataError;
use crate::domain::market::PriceSeries;
use async_trait::async_trait;

/// Source of daily closing prices for one symbol.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    /// Most recent `days` trading days, oldest first.
    async fn daily_closes(&self, symbol: &str, days: usize)
    -> Result<PriceSeries, MarketDataError>;

    /// Short provider name for logs
    fn name(&self) -> &str;
}
