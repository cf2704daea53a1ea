//! Session-level entry point: one service instance per caller, one request at a time.

use crate::application::ml::pipeline;
use crate::application::ml::{CancellationFlag, LoggingObserver, NumericBackend, TrainingObserver};
use crate::domain::errors::PipelineError;
use crate::domain::market::PriceSeries;
use crate::domain::ml::ModelSpec;
use crate::domain::prediction::{ChartOverlay, PredictionReport, TrainingSummary};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// What to do with a request that arrives while another one is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Fail fast with `SessionBusy`
    #[default]
    Reject,
    /// Wait for the in-flight request to finish
    Queue,
}

impl FromStr for OverlapPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(OverlapPolicy::Reject),
            "queue" => Ok(OverlapPolicy::Queue),
            _ => anyhow::bail!("Invalid OVERLAP_POLICY: {}. Must be 'reject' or 'queue'", s),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapPolicy::Reject => write!(f, "reject"),
            OverlapPolicy::Queue => write!(f, "queue"),
        }
    }
}

pub struct PredictionService {
    backend: Arc<NumericBackend>,
    spec: ModelSpec,
    overlap: OverlapPolicy,
    timeout: Option<Duration>,
    gate: Arc<Mutex<()>>,
}

impl PredictionService {
    pub fn new(backend: Arc<NumericBackend>, spec: ModelSpec) -> Self {
        Self {
            backend,
            spec,
            overlap: OverlapPolicy::default(),
            timeout: None,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// True while a request holds the session, including a timed-out one still winding down.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn predict(
        &self,
        symbol: &str,
        series: PriceSeries,
    ) -> Result<PredictionReport, PipelineError> {
        self.predict_observed(symbol, series, Arc::new(LoggingObserver), CancellationFlag::new())
            .await
    }

    /// Trains a fresh model on `series` and forecasts the next close.
    ///
    /// Progress goes to `observer`; setting `cancel` stops training at the next epoch boundary.
    pub async fn predict_observed(
        &self,
        symbol: &str,
        series: PriceSeries,
        observer: Arc<dyn TrainingObserver>,
        cancel: CancellationFlag,
    ) -> Result<PredictionReport, PipelineError> {
        let permit = match self.overlap {
            OverlapPolicy::Reject => Arc::clone(&self.gate).try_lock_owned().map_err(|_| {
                warn!("Rejecting prediction for {}: session busy", symbol);
                PipelineError::SessionBusy
            })?,
            OverlapPolicy::Queue => Arc::clone(&self.gate).lock_owned().await,
        };

        let request_id = Uuid::new_v4();
        info!(
            "Request {}: predicting next close for {} from {} days",
            request_id,
            symbol,
            series.len()
        );

        let backend = Arc::clone(&self.backend);
        let spec = self.spec.clone();
        let worker_series = series.clone();
        let worker_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            // The session stays busy until the numeric work has actually stopped
            let _permit = permit;
            let mut scope = backend.open_scope(request_id);
            let result = pipeline::run(
                &mut scope,
                &worker_series,
                &spec,
                observer.as_ref(),
                &worker_cancel,
            );
            scope.close();
            result
        });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    warn!("Request {}: timed out after {:?}", request_id, limit);
                    return Err(PipelineError::TimedOut {
                        after_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => task.await,
        };

        let output = joined.map_err(|e| PipelineError::TrainingFailure {
            epoch: 0,
            reason: format!("worker task failed: {}", e),
        })??;

        info!(
            "Request {}: {} {:.2} -> {:.2} (confidence {})",
            request_id,
            symbol,
            output.prediction.current_price(),
            output.prediction.predicted_price(),
            output.prediction.confidence_label()
        );

        Ok(PredictionReport {
            symbol: symbol.to_string(),
            chart: ChartOverlay::build(&series, &output.prediction),
            training: TrainingSummary::from(&output.history),
            prediction: output.prediction,
        })
    }
}
