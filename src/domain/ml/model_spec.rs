//! Hyperparameters of the sequence model.
//!
//! A `ModelSpec` is fixed for the lifetime of one training run. Two presets exist:
//! `daily` (canonical, 14-day window, stacked LSTM) and `compact` (5-day window, single LSTM).

use crate::domain::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Loss minimized by the trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    MeanSquaredError,
}

impl LossFunction {
    /// Per-example loss for `error = output - target`
    pub fn value(self, error: f64) -> f64 {
        match self {
            LossFunction::MeanSquaredError => error * error,
        }
    }

    /// d(loss)/d(output) for `error = output - target`
    pub fn gradient(self, error: f64) -> f64 {
        match self {
            LossFunction::MeanSquaredError => 2.0 * error,
        }
    }
}

/// One LSTM layer and the dropout applied to its output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecurrentLayerSpec {
    pub units: usize,
    pub dropout: f64,
}

impl RecurrentLayerSpec {
    pub fn new(units: usize, dropout: f64) -> Self {
        Self { units, dropout }
    }
}

/// Named model presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelProfile {
    Daily,
    Compact,
}

impl ModelProfile {
    pub fn spec(&self) -> ModelSpec {
        match self {
            ModelProfile::Daily => ModelSpec::daily(),
            ModelProfile::Compact => ModelSpec::compact(),
        }
    }
}

impl FromStr for ModelProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(ModelProfile::Daily),
            "compact" => Ok(ModelProfile::Compact),
            _ => anyhow::bail!(
                "Invalid MODEL_PROFILE: {}. Must be 'daily' or 'compact'",
                s
            ),
        }
    }
}

impl fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProfile::Daily => write!(f, "daily"),
            ModelProfile::Compact => write!(f, "compact"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    window_size: usize,
    recurrent_layers: Vec<RecurrentLayerSpec>,
    dense_units: Option<usize>,
    learning_rate: f64,
    loss: LossFunction,
    epochs: usize,
    batch_size: usize,
    shuffle: bool,
    validation_split: Option<f64>,
    seed: Option<u64>,
}

impl ModelSpec {
    /// Canonical configuration: two stacked LSTMs over a two-week window.
    pub fn daily() -> Self {
        Self {
            window_size: 14,
            recurrent_layers: vec![
                RecurrentLayerSpec::new(100, 0.2),
                RecurrentLayerSpec::new(50, 0.2),
            ],
            dense_units: Some(32),
            learning_rate: 0.0005,
            loss: LossFunction::MeanSquaredError,
            epochs: 150,
            batch_size: 32,
            shuffle: true,
            validation_split: Some(0.1),
            seed: None,
        }
    }

    /// Small single-layer configuration over a one-week window.
    pub fn compact() -> Self {
        Self {
            window_size: 5,
            recurrent_layers: vec![RecurrentLayerSpec::new(32, 0.0)],
            dense_units: None,
            learning_rate: 0.01,
            loss: LossFunction::MeanSquaredError,
            epochs: 100,
            batch_size: 8,
            shuffle: false,
            validation_split: None,
            seed: None,
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_recurrent_layers(mut self, layers: Vec<RecurrentLayerSpec>) -> Self {
        self.recurrent_layers = layers;
        self
    }

    pub fn with_dense_units(mut self, units: Option<usize>) -> Self {
        self.dense_units = units;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_validation_split(mut self, split: Option<f64>) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn recurrent_layers(&self) -> &[RecurrentLayerSpec] {
        &self.recurrent_layers
    }

    pub fn dense_units(&self) -> Option<usize> {
        self.dense_units
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn loss(&self) -> LossFunction {
        self.loss
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn validation_split(&self) -> Option<f64> {
        self.validation_split
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Shortest price series this spec can train on.
    pub fn min_series_len(&self) -> usize {
        self.window_size + 1
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window_size == 0 {
            return Err(invalid("window_size", "must be at least 1"));
        }
        if self.recurrent_layers.is_empty() {
            return Err(invalid(
                "recurrent_layers",
                "at least one recurrent layer is required",
            ));
        }
        for layer in &self.recurrent_layers {
            if layer.units == 0 {
                return Err(invalid("recurrent_layers", "layer width must be at least 1"));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return Err(invalid(
                    "recurrent_layers",
                    format!("dropout {} is outside [0, 1)", layer.dropout),
                ));
            }
        }
        if self.dense_units == Some(0) {
            return Err(invalid("dense_units", "dense width must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid(
                "learning_rate",
                format!("{} must be a positive number", self.learning_rate),
            ));
        }
        if self.epochs == 0 {
            return Err(invalid("epochs", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if let Some(split) = self.validation_split {
            if !(0.0..1.0).contains(&split) {
                return Err(invalid(
                    "validation_split",
                    format!("{} is outside [0, 1)", split),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::daily()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidSpec {
        field,
        reason: reason.into(),
    }
}
