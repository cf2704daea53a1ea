// Price history adapters behind the PriceHistorySource port
pub mod alpha_vantage;
pub mod csv_source;
pub mod http_client_factory;
pub mod mock;

pub use alpha_vantage::AlphaVantageClient;
pub use csv_source::CsvPriceSource;
pub use mock::StaticPriceSource;
