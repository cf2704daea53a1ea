use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;

use super::init::glorot_uniform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
        }
    }

    fn derivative(&self, pre_activation: f64) -> f64 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu => {
                if pre_activation > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Fully connected layer `y = act(W x + b)`
#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// (out, in)
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl DenseGradients {
    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|v| v.is_finite()) && self.bias.iter().all(|v| v.is_finite())
    }

    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }
}

#[derive(Debug, Clone)]
pub struct DenseCache {
    input: Array1<f64>,
    pre_activation: Array1<f64>,
}

impl DenseLayer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        units: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: glorot_uniform(units, input_size, rng),
            bias: Array1::zeros(units),
            activation,
        }
    }

    pub fn units(&self) -> usize {
        self.bias.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    pub fn zero_gradients(&self) -> DenseGradients {
        DenseGradients {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let activation = self.activation;
        (self.weights.dot(input) + &self.bias).mapv(|v| activation.apply(v))
    }

    pub fn forward_cached(&self, input: &Array1<f64>) -> (Array1<f64>, DenseCache) {
        let pre_activation = self.weights.dot(input) + &self.bias;
        let activation = self.activation;
        let output = pre_activation.mapv(|v| activation.apply(v));
        (
            output,
            DenseCache {
                input: input.clone(),
                pre_activation,
            },
        )
    }

    /// Accumulates parameter gradients and returns the gradient w.r.t. the input.
    pub fn backward(
        &self,
        cache: &DenseCache,
        d_output: &Array1<f64>,
        grads: &mut DenseGradients,
    ) -> Array1<f64> {
        let activation = self.activation;
        let d_pre = d_output * &cache.pre_activation.mapv(|v| activation.derivative(v));

        let d_col = d_pre.view().insert_axis(Axis(1));
        grads.weights += &d_col.dot(&cache.input.view().insert_axis(Axis(0)));
        grads.bias += &d_pre;

        self.weights.t().dot(&d_pre)
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
