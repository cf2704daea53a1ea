//! Stacked LSTM regressor: LSTM (+ dropout) layers, optional ReLU dense layer, one linear output.

use super::backend::Footprint;
use super::dense::{Activation, DenseCache, DenseGradients, DenseLayer};
use super::lstm::{LstmCache, LstmGradients, LstmLayer};
use crate::domain::ml::ModelSpec;
use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct SequenceModel {
    window_size: usize,
    recurrent: Vec<LstmLayer>,
    dropout: Vec<f64>,
    hidden: Option<DenseLayer>,
    head: DenseLayer,
}

/// Gradient buffers mirroring the model's parameter blocks
#[derive(Debug, Clone)]
pub struct ModelGradients {
    recurrent: Vec<LstmGradients>,
    hidden: Option<DenseGradients>,
    head: DenseGradients,
}

impl ModelGradients {
    /// Zeroes every block in place for the next batch.
    pub fn clear(&mut self) {
        for grads in &mut self.recurrent {
            grads.kernel.fill(0.0);
            grads.recurrent.fill(0.0);
            grads.bias.fill(0.0);
        }
        if let Some(hidden) = self.hidden.as_mut() {
            hidden.weights.fill(0.0);
            hidden.bias.fill(0.0);
        }
        self.head.weights.fill(0.0);
        self.head.bias.fill(0.0);
    }

    pub fn is_finite(&self) -> bool {
        self.recurrent.iter().all(|g| g.is_finite())
            && self.hidden.as_ref().is_none_or(|g| g.is_finite())
            && self.head.is_finite()
    }

    /// Blocks in the same order as [`SequenceModel::parameters_mut`].
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut views: Vec<ArrayViewD<'_, f64>> =
            self.recurrent.iter().flat_map(|g| g.views()).collect();
        if let Some(hidden) = &self.hidden {
            views.extend(hidden.views());
        }
        views.extend(self.head.views());
        views
    }
}

/// Everything a training forward pass produced for one window
#[derive(Debug)]
pub struct ForwardTrace {
    pub output: f64,
    steps: usize,
    recurrent: Vec<LstmCache>,
    masks: Vec<Option<Array2<f64>>>,
    hidden: Option<DenseCache>,
    head: DenseCache,
}

impl SequenceModel {
    /// Builds the architecture described by `spec` with freshly initialized weights.
    pub fn new<R: Rng + ?Sized>(spec: &ModelSpec, rng: &mut R) -> Self {
        let layers = spec.recurrent_layers();
        let mut recurrent = Vec::with_capacity(layers.len());
        let mut input_size = 1;
        for (idx, layer) in layers.iter().enumerate() {
            let return_sequences = idx + 1 < layers.len();
            recurrent.push(LstmLayer::new(input_size, layer.units, return_sequences, rng));
            input_size = layer.units;
        }

        let hidden = spec.dense_units().map(|units| {
            let dense = DenseLayer::new(input_size, units, Activation::Relu, rng);
            input_size = units;
            dense
        });
        let head = DenseLayer::new(input_size, 1, Activation::Linear, rng);

        Self {
            window_size: spec.window_size(),
            recurrent,
            dropout: layers.iter().map(|l| l.dropout).collect(),
            hidden,
            head,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn parameter_count(&self) -> usize {
        self.recurrent.iter().map(|l| l.parameter_count()).sum::<usize>()
            + self.hidden.as_ref().map_or(0, |h| h.parameter_count())
            + self.head.parameter_count()
    }

    pub fn zero_gradients(&self) -> ModelGradients {
        ModelGradients {
            recurrent: self.recurrent.iter().map(|l| l.zero_gradients()).collect(),
            hidden: self.hidden.as_ref().map(|h| h.zero_gradients()),
            head: self.head.zero_gradients(),
        }
    }

    /// Inference forward pass, dropout disabled.
    pub fn predict(&self, window: ArrayView1<'_, f64>) -> f64 {
        let mut sequence = as_sequence(window);
        for layer in &self.recurrent {
            let hidden = layer.forward(&sequence);
            sequence = emitted(layer, hidden);
        }

        let mut features: Array1<f64> = sequence.row(0).to_owned();
        if let Some(hidden) = &self.hidden {
            features = hidden.forward(&features);
        }
        self.head.forward(&features)[0]
    }

    /// Training forward pass with dropout masks drawn from `rng`.
    pub fn forward_train<R: Rng + ?Sized>(
        &self,
        window: ArrayView1<'_, f64>,
        rng: &mut R,
    ) -> ForwardTrace {
        let mut sequence = as_sequence(window);
        let mut caches = Vec::with_capacity(self.recurrent.len());
        let mut masks = Vec::with_capacity(self.recurrent.len());

        for (layer, &rate) in self.recurrent.iter().zip(&self.dropout) {
            let (hidden, cache) = layer.forward_cached(&sequence);
            let mut out = emitted(layer, hidden);
            let mask = dropout_mask(out.raw_dim(), rate, rng);
            if let Some(mask) = &mask {
                out *= mask;
            }
            caches.push(cache);
            masks.push(mask);
            sequence = out;
        }

        let features: Array1<f64> = sequence.row(0).to_owned();
        let (features, hidden_cache) = match &self.hidden {
            Some(hidden) => {
                let (out, cache) = hidden.forward_cached(&features);
                (out, Some(cache))
            }
            None => (features, None),
        };
        let (output, head_cache) = self.head.forward_cached(&features);

        ForwardTrace {
            output: output[0],
            steps: window.len(),
            recurrent: caches,
            masks,
            hidden: hidden_cache,
            head: head_cache,
        }
    }

    /// Accumulates gradients of the loss given `d_output = dL/d(output)`.
    pub fn backward(&self, trace: &ForwardTrace, d_output: f64, grads: &mut ModelGradients) {
        let mut d_features = self
            .head
            .backward(&trace.head, &Array1::from_elem(1, d_output), &mut grads.head);

        if let (Some(hidden), Some(cache), Some(hidden_grads)) =
            (&self.hidden, &trace.hidden, grads.hidden.as_mut())
        {
            d_features = hidden.backward(cache, &d_features, hidden_grads);
        }

        let mut d_out = d_features.insert_axis(Axis(0));

        for idx in (0..self.recurrent.len()).rev() {
            let layer = &self.recurrent[idx];
            if let Some(mask) = &trace.masks[idx] {
                d_out *= mask;
            }

            let d_hidden = if layer.returns_sequences() {
                d_out
            } else {
                let mut full = Array2::zeros((trace.steps, layer.units()));
                full.row_mut(trace.steps - 1).assign(&d_out.row(0));
                full
            };

            d_out = layer.backward(&trace.recurrent[idx], &d_hidden, &mut grads.recurrent[idx]);
        }
    }

    /// Parameter blocks in a fixed order shared with [`ModelGradients::views`].
    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params: Vec<ArrayViewMutD<'_, f64>> = self
            .recurrent
            .iter_mut()
            .flat_map(|l| l.parameters_mut())
            .collect();
        if let Some(hidden) = self.hidden.as_mut() {
            params.extend(hidden.parameters_mut());
        }
        params.extend(self.head.parameters_mut());
        params
    }
}

impl Footprint for SequenceModel {
    fn elements(&self) -> usize {
        self.parameter_count()
    }
}

impl Footprint for ModelGradients {
    fn elements(&self) -> usize {
        self.views().iter().map(|v| v.len()).sum()
    }
}

/// (T) window -> (T, 1) single-feature sequence
fn as_sequence(window: ArrayView1<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((window.len(), 1), |(t, _)| window[t])
}

/// Full sequence for stacked layers, final step only for the last layer.
fn emitted(layer: &LstmLayer, hidden: Array2<f64>) -> Array2<f64> {
    if layer.returns_sequences() {
        hidden
    } else {
        let last = hidden.nrows() - 1;
        hidden.slice(s![last..last + 1, ..]).to_owned()
    }
}

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)`.
fn dropout_mask<R: Rng + ?Sized>(
    shape: ndarray::Ix2,
    rate: f64,
    rng: &mut R,
) -> Option<Array2<f64>> {
    if rate <= 0.0 {
        return None;
    }
    let keep = 1.0 / (1.0 - rate);
    Some(Array2::from_shape_fn(shape, |_| {
        if rng.random::<f64>() < rate { 0.0 } else { keep }
    }))
}
