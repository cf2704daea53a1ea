use crate::domain::market::trading_calendar::next_trading_day;
use crate::domain::market::PriceSeries;
use crate::domain::ml::TrainingHistory;
use serde::{Deserialize, Serialize};

pub const NOT_AVAILABLE: &str = "N/A";

/// One-step-ahead forecast for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    current_price: f64,
    predicted_price: f64,
    confidence: f64,
}

impl Prediction {
    pub fn new(current_price: f64, predicted_price: f64, confidence: f64) -> Self {
        Self {
            current_price,
            predicted_price,
            confidence,
        }
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn predicted_price(&self) -> f64 {
        self.predicted_price
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn change(&self) -> f64 {
        self.predicted_price - self.current_price
    }

    pub fn change_pct(&self) -> f64 {
        if self.current_price == 0.0 {
            return 0.0;
        }
        self.change() / self.current_price * 100.0
    }

    /// Confidence as a percentage, or `N/A` when it is not a number.
    pub fn confidence_label(&self) -> String {
        if self.confidence.is_finite() {
            format!("{:.1}%", self.confidence * 100.0)
        } else {
            NOT_AVAILABLE.to_string()
        }
    }
}

/// Chart data: history plus a sparse overlay bridging the last close to the forecast.
///
/// `labels` has one more entry than the input (the next trading day). `historical` has the
/// input length. `predicted` is aligned with `labels` and holds values only at the last
/// historical position (current price) and the extra position (predicted price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOverlay {
    pub labels: Vec<String>,
    pub historical: Vec<f64>,
    pub predicted: Vec<Option<f64>>,
}

impl ChartOverlay {
    pub fn build(series: &PriceSeries, prediction: &Prediction) -> Self {
        let mut labels: Vec<String> = series.dates().iter().map(|d| d.to_string()).collect();
        labels.push(next_trading_day(series.last().date).to_string());

        let historical = series.closes();

        let mut predicted = vec![None; historical.len() + 1];
        let last = historical.len() - 1;
        predicted[last] = Some(prediction.current_price());
        predicted[last + 1] = Some(prediction.predicted_price());

        Self {
            labels,
            historical,
            predicted,
        }
    }
}

/// Summary of the loss trajectory for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub epochs: usize,
    pub final_loss: Option<f64>,
    pub final_val_loss: Option<f64>,
}

impl From<&TrainingHistory> for TrainingSummary {
    fn from(history: &TrainingHistory) -> Self {
        Self {
            epochs: history.len(),
            final_loss: history.final_loss(),
            final_val_loss: history.final_val_loss(),
        }
    }
}

/// Everything the presentation layer needs for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReport {
    pub symbol: String,
    pub prediction: Prediction,
    pub chart: ChartOverlay,
    pub training: TrainingSummary,
}
