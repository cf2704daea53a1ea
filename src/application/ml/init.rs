use ndarray::Array2;
use rand::Rng;

/// Glorot/Xavier uniform initialization for a (fan_out, fan_in) kernel.
pub fn glorot_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_glorot_uniform_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let weights = glorot_uniform(40, 10, &mut rng);
        let limit = (6.0f64 / 50.0).sqrt();

        assert_eq!(weights.dim(), (40, 10));
        assert!(weights.iter().all(|w| w.abs() < limit));
        assert!(weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = glorot_uniform(4, 3, &mut StdRng::seed_from_u64(9));
        let b = glorot_uniform(4, 3, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
