//! Adam optimizer over ndarray parameter blocks.
//!
//! ```text
//! m = beta1 * m + (1 - beta1) * g
//! v = beta2 * v + (1 - beta2) * g^2
//! m_hat = m / (1 - beta1^t)
//! v_hat = v / (1 - beta2^t)
//! p = p - lr * m_hat / (sqrt(v_hat) + epsilon)
//! ```

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    /// Moment estimates per parameter block, in the order blocks are passed to `step`.
    moments: Vec<(ArrayD<f64>, ArrayD<f64>)>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
            t: 0,
        }
    }

    pub fn timestep(&self) -> i32 {
        self.t
    }

    /// Applies one update. `params` and `grads` must list the same blocks in the same order
    /// on every call.
    pub fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: Vec<ArrayViewD<'_, f64>>) {
        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t);
        let (lr, beta1, beta2, epsilon) = (self.learning_rate, self.beta1, self.beta2, self.epsilon);

        for (slot, (mut param, grad)) in params.into_iter().zip(grads).enumerate() {
            if self.moments.len() <= slot {
                self.moments.push((
                    ArrayD::zeros(param.raw_dim()),
                    ArrayD::zeros(param.raw_dim()),
                ));
            }
            let (m, v) = &mut self.moments[slot];

            Zip::from(&mut param)
                .and(&grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias_correction1;
                    let v_hat = *v / bias_correction2;
                    *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
    }
}
