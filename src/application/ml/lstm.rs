//! LSTM layer with full backpropagation through time.
//!
//! Gates are packed in `i, f, g, o` order along the first axis of the kernels:
//!
//! ```text
//! z  = W x_t + U h_{t-1} + b
//! i  = σ(z_i)   f = σ(z_f)   g = tanh(z_g)   o = σ(z_o)
//! c_t = f ⊙ c_{t-1} + i ⊙ g
//! h_t = o ⊙ tanh(c_t)
//! ```

use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::Rng;

use super::init::glorot_uniform;

#[derive(Debug, Clone)]
pub struct LstmLayer {
    input_size: usize,
    units: usize,
    return_sequences: bool,
    /// (4H, input)
    kernel: Array2<f64>,
    /// (4H, H)
    recurrent: Array2<f64>,
    /// (4H)
    bias: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmGradients {
    pub kernel: Array2<f64>,
    pub recurrent: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LstmGradients {
    pub fn is_finite(&self) -> bool {
        self.kernel.iter().all(|v| v.is_finite())
            && self.recurrent.iter().all(|v| v.is_finite())
            && self.bias.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone)]
struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

/// Activations kept from a training forward pass
#[derive(Debug, Clone)]
pub struct LstmCache {
    steps: Vec<StepCache>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        units: usize,
        return_sequences: bool,
        rng: &mut R,
    ) -> Self {
        let gates = 4 * units;
        let mut bias = Array1::zeros(gates);
        // Forget gate starts open
        bias.slice_mut(s![units..2 * units]).fill(1.0);

        Self {
            input_size,
            units,
            return_sequences,
            kernel: glorot_uniform(gates, input_size, rng),
            recurrent: glorot_uniform(gates, units, rng),
            bias,
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn returns_sequences(&self) -> bool {
        self.return_sequences
    }

    pub fn parameter_count(&self) -> usize {
        self.kernel.len() + self.recurrent.len() + self.bias.len()
    }

    pub fn zero_gradients(&self) -> LstmGradients {
        LstmGradients {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    /// Hidden state at every timestep, shape (T, H).
    pub fn forward(&self, inputs: &Array2<f64>) -> Array2<f64> {
        let steps = inputs.nrows();
        let mut hidden = Array2::zeros((steps, self.units));
        let mut h = Array1::zeros(self.units);
        let mut c = Array1::zeros(self.units);

        for (t, x) in inputs.axis_iter(Axis(0)).enumerate() {
            let (i, f, g, o) = self.gates(x, &h);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
            hidden.row_mut(t).assign(&h);
        }
        hidden
    }

    /// Same as [`forward`](Self::forward), keeping what backpropagation needs.
    pub fn forward_cached(&self, inputs: &Array2<f64>) -> (Array2<f64>, LstmCache) {
        let steps = inputs.nrows();
        let mut hidden = Array2::zeros((steps, self.units));
        let mut cache = Vec::with_capacity(steps);
        let mut h = Array1::zeros(self.units);
        let mut c = Array1::zeros(self.units);

        for (t, x) in inputs.axis_iter(Axis(0)).enumerate() {
            let (i, f, g, o) = self.gates(x, &h);
            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;
            hidden.row_mut(t).assign(&h_next);

            cache.push(StepCache {
                x: x.to_owned(),
                h_prev: std::mem::replace(&mut h, h_next),
                c_prev: std::mem::replace(&mut c, c_next),
                i,
                f,
                g,
                o,
                tanh_c,
            });
        }
        (hidden, LstmCache { steps: cache })
    }

    /// Backpropagation through time.
    ///
    /// `d_hidden` is the loss gradient w.r.t. every emitted hidden state, shape (T, H).
    /// Returns the gradient w.r.t. the inputs, shape (T, input).
    pub fn backward(
        &self,
        cache: &LstmCache,
        d_hidden: &Array2<f64>,
        grads: &mut LstmGradients,
    ) -> Array2<f64> {
        let units = self.units;
        let steps = cache.steps.len();
        let mut d_inputs = Array2::zeros((steps, self.input_size));
        let mut dh_next = Array1::<f64>::zeros(units);
        let mut dc_next = Array1::<f64>::zeros(units);

        for t in (0..steps).rev() {
            let step = &cache.steps[t];
            let dh = &d_hidden.row(t) + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array1::zeros(4 * units);
            dz.slice_mut(s![0..units])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![units..2 * units])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * units..3 * units])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * units..4 * units])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            let dz_col = dz.view().insert_axis(Axis(1));
            grads.kernel += &dz_col.dot(&step.x.view().insert_axis(Axis(0)));
            grads.recurrent += &dz_col.dot(&step.h_prev.view().insert_axis(Axis(0)));
            grads.bias += &dz;

            d_inputs.row_mut(t).assign(&self.kernel.t().dot(&dz));
            dh_next = self.recurrent.t().dot(&dz);
        }
        d_inputs
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![
            self.kernel.view_mut().into_dyn(),
            self.recurrent.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }

    fn gates(
        &self,
        x: ArrayView1<'_, f64>,
        h_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let units = self.units;
        let z = self.kernel.dot(&x) + self.recurrent.dot(h_prev) + &self.bias;
        let i = z.slice(s![0..units]).mapv(sigmoid);
        let f = z.slice(s![units..2 * units]).mapv(sigmoid);
        let g = z.slice(s![2 * units..3 * units]).mapv(f64::tanh);
        let o = z.slice(s![3 * units..4 * units]).mapv(sigmoid);
        (i, f, g, o)
    }
}

impl LstmGradients {
    pub fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        vec![
            self.kernel.view().into_dyn(),
            self.recurrent.view().into_dyn(),
            self.bias.view().into_dyn(),
        ]
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sequence() -> Array2<f64> {
        Array2::from_shape_vec((4, 1), vec![0.1, 0.4, 0.35, 0.8]).unwrap()
    }

    /// Loss used for gradient checks: sum of the final hidden state.
    fn final_sum(layer: &LstmLayer, inputs: &Array2<f64>) -> f64 {
        let hidden = layer.forward(inputs);
        hidden.row(hidden.nrows() - 1).sum()
    }

    #[test]
    fn test_forward_shapes_and_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmLayer::new(1, 6, true, &mut rng);
        let hidden = layer.forward(&sequence());

        assert_eq!(hidden.dim(), (4, 6));
        assert!(hidden.iter().all(|h| h.abs() < 1.0));
        assert_eq!(layer.parameter_count(), 4 * 6 * (1 + 6 + 1));
    }

    #[test]
    fn test_cached_forward_matches_forward() {
        let mut rng = StdRng::seed_from_u64(11);
        let layer = LstmLayer::new(1, 3, false, &mut rng);
        let inputs = sequence();

        let (cached, _) = layer.forward_cached(&inputs);
        let plain = layer.forward(&inputs);
        for (a, b) in cached.iter().zip(plain.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = LstmLayer::new(1, 3, false, &mut rng);
        let inputs = sequence();

        let (_, cache) = layer.forward_cached(&inputs);
        let mut d_hidden = Array2::zeros((4, 3));
        d_hidden.row_mut(3).fill(1.0);
        let mut grads = layer.zero_gradients();
        let d_inputs = layer.backward(&cache, &d_hidden, &mut grads);

        let eps = 1e-6;
        for (r, c) in [(0, 0), (4, 0), (7, 0), (11, 0)] {
            let original = layer.kernel[[r, c]];
            layer.kernel[[r, c]] = original + eps;
            let plus = final_sum(&layer, &inputs);
            layer.kernel[[r, c]] = original - eps;
            let minus = final_sum(&layer, &inputs);
            layer.kernel[[r, c]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - grads.kernel[[r, c]]).abs() < 1e-6,
                "kernel[{},{}]: numeric {} vs analytic {}",
                r,
                c,
                numeric,
                grads.kernel[[r, c]]
            );
        }

        for (r, c) in [(1, 2), (5, 0), (10, 1)] {
            let original = layer.recurrent[[r, c]];
            layer.recurrent[[r, c]] = original + eps;
            let plus = final_sum(&layer, &inputs);
            layer.recurrent[[r, c]] = original - eps;
            let minus = final_sum(&layer, &inputs);
            layer.recurrent[[r, c]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!((numeric - grads.recurrent[[r, c]]).abs() < 1e-6);
        }

        let mut shifted = inputs.clone();
        shifted[[1, 0]] += eps;
        let plus = final_sum(&layer, &shifted);
        shifted[[1, 0]] -= 2.0 * eps;
        let minus = final_sum(&layer, &shifted);
        let numeric = (plus - minus) / (2.0 * eps);
        assert!((numeric - d_inputs[[1, 0]]).abs() < 1e-6);
    }
}
