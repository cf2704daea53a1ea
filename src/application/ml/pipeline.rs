//! normalize -> window -> train -> predict, driven through a [`RequestScope`].

use super::backend::RequestScope;
use super::observer::{CancellationFlag, TrainingObserver};
use super::predictor;
use super::trainer::Trainer;
use crate::domain::errors::PipelineError;
use crate::domain::market::PriceSeries;
use crate::domain::ml::normalizer::normalize;
use crate::domain::ml::window::last_window;
use crate::domain::ml::{ModelSpec, RequestState, TrainingHistory, WindowDataset, confidence};
use crate::domain::prediction::Prediction;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub prediction: Prediction,
    pub history: TrainingHistory,
}

/// Runs one prediction request to a terminal state.
///
/// Every buffer created along the way is owned by [`run_stages`] and is gone by the time the
/// scope moves to `Done` or `Failed`.
pub fn run(
    scope: &mut RequestScope,
    series: &PriceSeries,
    spec: &ModelSpec,
    observer: &dyn TrainingObserver,
    cancel: &CancellationFlag,
) -> Result<PipelineOutput, PipelineError> {
    let result = run_stages(scope, series, spec, observer, cancel);

    if scope.outstanding() > 0 {
        warn!(
            "Request {}: {} buffers outstanding after the pipeline returned",
            scope.id(),
            scope.outstanding()
        );
    }

    match result {
        Ok(output) => {
            scope.advance(RequestState::Done)?;
            Ok(output)
        }
        Err(err) => {
            error!("Request {}: {}", scope.id(), err);
            scope.fail(&err);
            Err(err)
        }
    }
}

fn run_stages(
    scope: &mut RequestScope,
    series: &PriceSeries,
    spec: &ModelSpec,
    observer: &dyn TrainingObserver,
    cancel: &CancellationFlag,
) -> Result<PipelineOutput, PipelineError> {
    spec.validate()?;

    scope.advance(RequestState::Normalizing)?;
    let normalized = normalize(&series.closes())?;

    scope.advance(RequestState::Windowing)?;
    let dataset = WindowDataset::build(&normalized, spec.window_size())?;
    let window = last_window(&normalized, spec.window_size())?;
    debug!(
        "Request {}: {} windows of {} from {} closes",
        scope.id(),
        dataset.len(),
        spec.window_size(),
        normalized.len()
    );

    scope.advance(RequestState::Training)?;
    let mut rng = match spec.seed() {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let trained = Trainer::new(spec, observer, cancel).fit(scope, &dataset, &mut rng)?;

    scope.advance(RequestState::Predicting)?;
    let predicted_price = predictor::predict(&trained, &normalized, &window)?;
    let history = trained.into_history();

    let confidence = confidence::estimate(history.final_loss().unwrap_or(f64::NAN));
    let prediction = Prediction::new(series.last().close_price, predicted_price, confidence);

    Ok(PipelineOutput {
        prediction,
        history,
    })
}
