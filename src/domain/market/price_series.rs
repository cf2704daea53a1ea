use crate::domain::errors::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One trading day's close, as handed over by the data-retrieval collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close_price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close_price: f64) -> Self {
        Self { date, close_price }
    }

    /// Parses the `YYYY-MM-DD` date form used by market data providers.
    pub fn parse(date: &str, close_price: f64) -> Result<Self, PipelineError> {
        let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|e| {
            PipelineError::InvalidSeries {
                reason: format!("unparsable date '{}': {}", date, e),
            }
        })?;
        Ok(Self::new(date, close_price))
    }
}

/// Chronological daily closes for a single symbol.
///
/// Dates are unique and strictly increasing, closes are finite and positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, PipelineError> {
        if points.is_empty() {
            return Err(PipelineError::InvalidSeries {
                reason: "series is empty".to_string(),
            });
        }

        for point in &points {
            if !point.close_price.is_finite() || point.close_price <= 0.0 {
                return Err(PipelineError::InvalidSeries {
                    reason: format!(
                        "close on {} must be a positive number, got {}",
                        point.date, point.close_price
                    ),
                });
            }
        }

        if let Some(pair) = points.windows(2).find(|pair| pair[1].date <= pair[0].date) {
            return Err(PipelineError::InvalidSeries {
                reason: format!(
                    "dates must be strictly increasing ({} is followed by {})",
                    pair[0].date, pair[1].date
                ),
            });
        }

        Ok(Self { points })
    }

    /// Builds a series from bare closes on consecutive calendar days starting at `start`.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Result<Self, PipelineError> {
        let points = closes
            .iter()
            .zip(start.iter_days())
            .map(|(&close, date)| PricePoint::new(date, close))
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close_price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// The trailing `days` points (the whole series when shorter).
    pub fn most_recent(&self, days: usize) -> PriceSeries {
        let start = self.points.len().saturating_sub(days.max(1));
        Self {
            points: self.points[start..].to_vec(),
        }
    }

    pub fn last(&self) -> &PricePoint {
        // Non-empty by construction
        &self.points[self.points.len() - 1]
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let points = Vec::<PricePoint>::deserialize(deserializer)?;
        PriceSeries::new(points).map_err(serde::de::Error::custom)
    }
}
