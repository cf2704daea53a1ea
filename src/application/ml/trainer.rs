use super::adam::Adam;
use super::backend::{Leased, RequestScope};
use super::observer::{CancellationFlag, TrainingObserver};
use super::sequence_model::SequenceModel;
use crate::domain::errors::PipelineError;
use crate::domain::ml::{EpochEvent, LossFunction, ModelSpec, TrainingHistory, WindowDataset};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

/// A fitted model, still accounted to the request that trained it.
#[derive(Debug)]
pub struct TrainedModel {
    model: Leased<SequenceModel>,
    history: TrainingHistory,
}

impl TrainedModel {
    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Releases the parameters and keeps the loss trajectory.
    pub fn into_history(self) -> TrainingHistory {
        self.history
    }
}

/// Mini-batch Adam training of a [`SequenceModel`] on a window dataset.
pub struct Trainer<'a> {
    spec: &'a ModelSpec,
    observer: &'a dyn TrainingObserver,
    cancel: &'a CancellationFlag,
}

impl<'a> Trainer<'a> {
    pub fn new(
        spec: &'a ModelSpec,
        observer: &'a dyn TrainingObserver,
        cancel: &'a CancellationFlag,
    ) -> Self {
        Self {
            spec,
            observer,
            cancel,
        }
    }

    pub fn fit<R: Rng + ?Sized>(
        &self,
        scope: &RequestScope,
        dataset: &WindowDataset,
        rng: &mut R,
    ) -> Result<TrainedModel, PipelineError> {
        let spec = self.spec;
        let examples = dataset.len();
        let window_size = dataset.window_size();
        if examples == 0 {
            return Err(PipelineError::InsufficientData {
                required: window_size + 1,
                actual: window_size,
            });
        }

        let windows = dataset.windows();
        let inputs = scope.track(
            "inputs",
            Array2::from_shape_fn((examples, window_size), |(i, j)| windows[i].input[j]),
        );
        let targets = scope.track(
            "targets",
            windows.iter().map(|w| w.target).collect::<Array1<f64>>(),
        );

        let train_len = training_len(examples, spec.validation_split());

        let mut model = scope.track("parameters", SequenceModel::new(spec, rng));
        let mut grads = scope.track("gradients", model.zero_gradients());
        let _optimizer_state = scope.lease("optimizer_state", 2 * model.parameter_count());
        let mut optimizer = Adam::new(spec.learning_rate());

        info!(
            "Request {}: training {} parameters on {} windows ({} held out) for {} epochs",
            scope.id(),
            model.parameter_count(),
            train_len,
            examples - train_len,
            spec.epochs()
        );

        let batch_size = spec.batch_size();
        let loss_fn = spec.loss();
        let mut order: Vec<usize> = (0..train_len).collect();
        let mut history = TrainingHistory::with_capacity(spec.epochs());

        for epoch in 1..=spec.epochs() {
            if self.cancel.is_cancelled() {
                info!("Request {}: cancelled before epoch {}", scope.id(), epoch);
                return Err(PipelineError::Cancelled {
                    completed_epochs: epoch - 1,
                });
            }

            if spec.shuffle() {
                order.shuffle(rng);
            }

            let mut total_loss = 0.0;
            for batch in order.chunks(batch_size) {
                grads.clear();
                let scale = 1.0 / batch.len() as f64;

                for &idx in batch {
                    let trace = model.forward_train(inputs.row(idx), rng);
                    let error = trace.output - targets[idx];
                    total_loss += loss_fn.value(error);
                    model.backward(&trace, scale * loss_fn.gradient(error), &mut grads);
                }

                if !grads.is_finite() {
                    return Err(PipelineError::TrainingFailure {
                        epoch,
                        reason: "non-finite gradient".to_string(),
                    });
                }
                optimizer.step(model.parameters_mut(), grads.views());
            }

            let loss = total_loss / train_len as f64;
            if !loss.is_finite() {
                return Err(PipelineError::TrainingFailure {
                    epoch,
                    reason: format!("loss is {}", loss),
                });
            }

            let val_loss = if train_len < examples {
                let val_loss = inference_loss(
                    &model,
                    loss_fn,
                    (train_len..examples).map(|i| (inputs.row(i), targets[i])),
                );
                if !val_loss.is_finite() {
                    return Err(PipelineError::TrainingFailure {
                        epoch,
                        reason: format!("validation loss is {}", val_loss),
                    });
                }
                Some(val_loss)
            } else {
                None
            };

            let event = EpochEvent {
                epoch,
                total_epochs: spec.epochs(),
                loss,
                val_loss,
            };
            history.record(event);
            self.observer.on_epoch_end(&event);
        }

        if let Some(loss) = history.final_loss() {
            debug!("Request {}: final training loss {:.6}", scope.id(), loss);
        }

        Ok(TrainedModel { model, history })
    }
}

/// Number of leading examples used for gradient updates.
fn training_len(examples: usize, validation_split: Option<f64>) -> usize {
    let Some(split) = validation_split else {
        return examples;
    };

    let split_at = (examples as f64 * (1.0 - split)).floor() as usize;
    if split_at == 0 {
        warn!(
            "Validation split {} leaves no training examples out of {}, training on all of them",
            split, examples
        );
        return examples;
    }
    split_at.min(examples)
}

/// Inference-mode loss over `(window, target)` pairs.
fn inference_loss<'a>(
    model: &SequenceModel,
    loss_fn: LossFunction,
    examples: impl Iterator<Item = (ArrayView1<'a, f64>, f64)>,
) -> f64 {
    let (sum, count) = examples.fold((0.0, 0usize), |(sum, count), (window, target)| {
        (sum + loss_fn.value(model.predict(window) - target), count + 1)
    });
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::backend::NumericBackend;
    use crate::application::ml::observer::NullObserver;
    use crate::domain::ml::normalizer::normalize;
    use crate::domain::ml::RecurrentLayerSpec;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn ramp_dataset(len: usize, window: usize) -> WindowDataset {
        let prices: Vec<f64> = (0..len).map(|i| 10.0 + i as f64).collect();
        WindowDataset::build(&normalize(&prices).unwrap(), window).unwrap()
    }

    fn small_spec() -> ModelSpec {
        ModelSpec::compact()
            .with_recurrent_layers(vec![RecurrentLayerSpec::new(8, 0.0)])
            .with_epochs(30)
            .with_seed(Some(7))
    }

    struct RecordingObserver(Mutex<Vec<EpochEvent>>);

    impl TrainingObserver for RecordingObserver {
        fn on_epoch_end(&self, event: &EpochEvent) {
            self.0.lock().unwrap().push(*event);
        }
    }

    #[test]
    fn test_training_len() {
        assert_eq!(training_len(10, None), 10);
        assert_eq!(training_len(10, Some(0.1)), 9);
        assert_eq!(training_len(15, Some(0.1)), 13);
        // floor(1 * 0.9) == 0 disables validation
        assert_eq!(training_len(1, Some(0.1)), 1);
    }

    #[test]
    fn test_fit_reduces_loss_and_reports_every_epoch() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let dataset = ramp_dataset(11, 5);
        let spec = small_spec();
        let observer = RecordingObserver(Mutex::new(Vec::new()));
        let cancel = CancellationFlag::new();
        let mut rng = StdRng::seed_from_u64(7);

        let trained = Trainer::new(&spec, &observer, &cancel)
            .fit(&scope, &dataset, &mut rng)
            .unwrap();

        let losses = trained.history().losses();
        assert_eq!(losses.len(), 30);
        assert!(losses.iter().all(|l| l.is_finite()));
        assert!(losses[29] < losses[0]);

        let events = observer.0.lock().unwrap();
        assert_eq!(events.len(), 30);
        assert_eq!(events[0].epoch, 1);
        assert_eq!(events[29].total_epochs, 30);

        // Only the parameters survive the call
        assert_eq!(scope.outstanding(), 1);
        drop(trained);
        assert_eq!(scope.outstanding(), 0);
    }

    #[test]
    fn test_validation_loss_recorded_when_split_set() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let dataset = ramp_dataset(16, 5);
        let spec = small_spec()
            .with_epochs(3)
            .with_validation_split(Some(0.2));
        let cancel = CancellationFlag::new();
        let mut rng = StdRng::seed_from_u64(1);

        let trained = Trainer::new(&spec, &NullObserver, &cancel)
            .fit(&scope, &dataset, &mut rng)
            .unwrap();

        assert_eq!(trained.history().val_losses().len(), 3);
        assert!(trained.history().final_val_loss().unwrap().is_finite());
    }

    #[test]
    fn test_single_window_dataset_trains() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let dataset = ramp_dataset(6, 5);
        assert_eq!(dataset.len(), 1);
        let spec = small_spec()
            .with_epochs(2)
            .with_validation_split(Some(0.1));
        let cancel = CancellationFlag::new();
        let mut rng = StdRng::seed_from_u64(3);

        let trained = Trainer::new(&spec, &NullObserver, &cancel)
            .fit(&scope, &dataset, &mut rng)
            .unwrap();
        assert_eq!(trained.history().len(), 2);
        assert!(trained.history().val_losses().is_empty());
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let dataset = ramp_dataset(11, 5);
        let spec = small_spec();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut rng = StdRng::seed_from_u64(7);

        let err = Trainer::new(&spec, &NullObserver, &cancel)
            .fit(&scope, &dataset, &mut rng)
            .unwrap_err();

        assert_eq!(err, PipelineError::Cancelled { completed_epochs: 0 });
        assert_eq!(scope.outstanding(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_divergent_training_fails_and_releases_buffers() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let dataset = ramp_dataset(11, 5);
        let spec = ModelSpec::compact()
            .with_learning_rate(1e300)
            .with_seed(Some(7));
        let observer = RecordingObserver(Mutex::new(Vec::new()));
        let cancel = CancellationFlag::new();
        let mut rng = StdRng::seed_from_u64(7);

        let err = Trainer::new(&spec, &observer, &cancel)
            .fit(&scope, &dataset, &mut rng)
            .unwrap_err();

        let PipelineError::TrainingFailure { epoch, .. } = &err else {
            panic!("expected TrainingFailure, got {:?}", err);
        };
        let epoch = *epoch;
        assert!(epoch >= 1 && epoch <= spec.epochs());
        // the failing epoch is never reported
        assert_eq!(observer.0.lock().unwrap().len(), epoch - 1);
        assert_eq!(scope.outstanding(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_same_seed_same_history() {
        let dataset = ramp_dataset(11, 5);
        let spec = small_spec().with_epochs(5).with_shuffle(true);
        let cancel = CancellationFlag::new();
        let backend = NumericBackend::standalone();

        let run = || {
            let scope = backend.open_scope(Uuid::new_v4());
            let mut rng = StdRng::seed_from_u64(42);
            Trainer::new(&spec, &NullObserver, &cancel)
                .fit(&scope, &dataset, &mut rng)
                .unwrap()
                .into_history()
        };

        assert_eq!(run(), run());
    }
}
