use super::trainer::TrainedModel;
use crate::domain::errors::PipelineError;
use crate::domain::ml::NormalizedSeries;
use ndarray::ArrayView1;

/// Interface for trained one-step-ahead models
pub trait Forecaster: Send + Sync {
    /// Next value on the normalized scale, from a window of normalized values.
    fn forecast_normalized(&self, window: &[f64]) -> Result<f64, PipelineError>;

    /// Number of values the model expects in a window
    fn window_size(&self) -> usize;

    /// Get model name/type
    fn name(&self) -> &str;
}

impl Forecaster for TrainedModel {
    fn forecast_normalized(&self, window: &[f64]) -> Result<f64, PipelineError> {
        Ok(self.model().predict(ArrayView1::from(window)))
    }

    fn window_size(&self) -> usize {
        self.model().window_size()
    }

    fn name(&self) -> &str {
        "lstm"
    }
}

/// Forecasts the next close in price units.
///
/// Runs a single inference-mode pass and maps the output back with the min/max captured
/// when `series` was normalized.
pub fn predict(
    model: &dyn Forecaster,
    series: &NormalizedSeries,
    window: &[f64],
) -> Result<f64, PipelineError> {
    if window.len() != model.window_size() {
        return Err(PipelineError::PredictionFailure {
            reason: format!(
                "{} expects a window of {} values, got {}",
                model.name(),
                model.window_size(),
                window.len()
            ),
        });
    }

    let normalized = model.forecast_normalized(window)?;
    if !normalized.is_finite() {
        return Err(PipelineError::PredictionFailure {
            reason: format!("{} produced {}", model.name(), normalized),
        });
    }

    let price = series.denormalize(normalized);
    if !price.is_finite() {
        return Err(PipelineError::PredictionFailure {
            reason: format!("denormalized price is {}", price),
        });
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::normalizer::normalize;

    struct Fixed(f64);

    impl Forecaster for Fixed {
        fn forecast_normalized(&self, _window: &[f64]) -> Result<f64, PipelineError> {
            Ok(self.0)
        }

        fn window_size(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_predict_denormalizes() {
        let series = normalize(&[10.0, 15.0, 20.0]).unwrap();
        let price = predict(&Fixed(0.5), &series, &[0.0, 0.5, 1.0]).unwrap();
        assert!((price - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_series_returns_level() {
        let series = normalize(&[50.0, 50.0, 50.0]).unwrap();
        let price = predict(&Fixed(0.93), &series, &[0.5, 0.5, 0.5]).unwrap();
        assert_eq!(price, 50.0);
    }

    #[test]
    fn test_window_shape_mismatch() {
        let series = normalize(&[10.0, 15.0, 20.0]).unwrap();
        let err = predict(&Fixed(0.5), &series, &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::PredictionFailure { .. }));
    }

    #[test]
    fn test_non_finite_output() {
        let series = normalize(&[10.0, 15.0, 20.0]).unwrap();
        let err = predict(&Fixed(f64::NAN), &series, &[0.0, 0.5, 1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::PredictionFailure { .. }));
    }
}
