// Daily price history
pub mod price_series;
pub mod trading_calendar;

pub use price_series::{PricePoint, PriceSeries};
