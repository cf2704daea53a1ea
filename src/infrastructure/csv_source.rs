use crate::domain::errors::MarketDataError;
use crate::domain::market::{PricePoint, PriceSeries};
use crate::domain::ports::PriceHistorySource;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
enum Location {
    /// `<dir>/<SYMBOL>.csv`
    Directory(PathBuf),
    /// One file, whatever symbol is asked for
    File(PathBuf),
}

/// Daily closes read from `date,close` CSV files
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "DATE", alias = "timestamp")]
    date: String,
    #[serde(alias = "Close", alias = "CLOSE", alias = "close_price", alias = "closePrice")]
    close: f64,
}

impl CsvPriceSource {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::Directory(path.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        match &self.location {
            Location::Directory(dir) => dir.join(format!("{}.csv", symbol)),
            Location::File(file) => file.clone(),
        }
    }
}

#[async_trait]
impl PriceHistorySource for CsvPriceSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<PriceSeries, MarketDataError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MarketDataError::InvalidSymbol { symbol });
        }

        let path = self.path_for(&symbol);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MarketDataError::NoData { symbol });
            }
            Err(e) => {
                return Err(MarketDataError::Transport {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let series = parse_csv_series(&contents, &symbol)?;
        info!(
            "Loaded {} closes for {} from {}",
            series.len(),
            symbol,
            display_name(&path)
        );
        Ok(series.most_recent(days))
    }

    fn name(&self) -> &str {
        "csv"
    }
}

/// Parses `date,close` rows in any order into an ascending series.
pub fn parse_csv_series(contents: &str, symbol: &str) -> Result<PriceSeries, MarketDataError> {
    let invalid = |reason: String| MarketDataError::InvalidData {
        symbol: symbol.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut points = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        // +2: header line and 1-based numbering
        let row = row.map_err(|e| invalid(format!("line {}: {}", line + 2, e)))?;
        let point =
            PricePoint::parse(&row.date, row.close).map_err(|e| invalid(e.to_string()))?;
        points.push(point);
    }

    if points.is_empty() {
        return Err(MarketDataError::NoData {
            symbol: symbol.to_string(),
        });
    }

    points.sort_by_key(|p| p.date);
    PriceSeries::new(points).map_err(|e| invalid(e.to_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_rows() {
        let csv = "date,close\n2024-03-05,11.5\n2024-03-04,11.0\n2024-03-06,12.25\n";
        let series = parse_csv_series(csv, "TEST").unwrap();
        assert_eq!(series.closes(), vec![11.0, 11.5, 12.25]);
    }

    #[test]
    fn test_header_aliases() {
        let csv = "Date,Close\n2024-03-04,11.0\n";
        assert_eq!(parse_csv_series(csv, "TEST").unwrap().len(), 1);
    }
}
