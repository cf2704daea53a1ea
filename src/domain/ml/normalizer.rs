//! Min/max scaling of a price series into `[0, 1]`.

use crate::domain::errors::PipelineError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Value every point takes when the series is flat.
pub const FLAT_SERIES_VALUE: f64 = 0.5;

/// A series rescaled into `[0, 1]` together with the bounds needed to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSeries {
    values: Vec<f64>,
    min: f64,
    max: f64,
}

impl NormalizedSeries {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Flat input, every value pinned to the midpoint.
    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }

    /// Maps a model output back onto the original price scale.
    pub fn denormalize(&self, value: f64) -> f64 {
        denormalize(value, self.min, self.max)
    }

    pub fn denormalize_all(&self) -> Vec<f64> {
        self.values.iter().map(|&v| self.denormalize(v)).collect()
    }
}

pub fn normalize(series: &[f64]) -> Result<NormalizedSeries, PipelineError> {
    if series.is_empty() {
        return Err(PipelineError::InvalidSeries {
            reason: "cannot normalize an empty series".to_string(),
        });
    }
    if let Some(bad) = series.iter().find(|v| !v.is_finite()) {
        return Err(PipelineError::InvalidSeries {
            reason: format!("cannot normalize non-finite value {}", bad),
        });
    }

    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let values = if max == min {
        warn!(
            "Flat price series ({} points at {}), using midpoint normalization",
            series.len(),
            min
        );
        vec![FLAT_SERIES_VALUE; series.len()]
    } else {
        let range = max - min;
        series.iter().map(|v| (v - min) / range).collect()
    };

    Ok(NormalizedSeries { values, min, max })
}

pub fn denormalize(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return min;
    }
    value * (max - min) + min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bounds() {
        let normalized = normalize(&[10.0, 15.0, 20.0]).unwrap();

        assert_eq!(normalized.values(), &[0.0, 0.5, 1.0]);
        assert_eq!(normalized.min(), 10.0);
        assert_eq!(normalized.max(), 20.0);
        assert!(!normalized.is_degenerate());
    }

    #[test]
    fn test_round_trip() {
        let prices = [187.44, 189.98, 186.01, 191.73, 190.0, 188.85, 192.53];
        let normalized = normalize(&prices).unwrap();
        let restored = normalized.denormalize_all();

        for (original, back) in prices.iter().zip(restored.iter()) {
            assert!((original - back).abs() < 1e-9, "{} != {}", original, back);
        }
        assert!(normalized.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_flat_series_uses_midpoint() {
        let normalized = normalize(&[50.0; 6]).unwrap();

        assert!(normalized.is_degenerate());
        assert!(normalized.values().iter().all(|&v| v == FLAT_SERIES_VALUE));
        assert_eq!(normalized.denormalize(0.5), 50.0);
        assert_eq!(normalized.denormalize(0.93), 50.0);
        assert_eq!(normalized.denormalize(-4.0), 50.0);
    }

    #[test]
    fn test_denormalize_extrapolates_linearly() {
        assert_eq!(denormalize(1.5, 10.0, 20.0), 25.0);
        assert_eq!(denormalize(-0.5, 10.0, 20.0), 5.0);
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert!(normalize(&[]).is_err());
        assert!(normalize(&[1.0, f64::INFINITY]).is_err());
    }
}
