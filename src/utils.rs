//! Numeric helpers shared by the layers and the forecast aggregation.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Xavier/Glorot normal initialization: N(0, 2 / (fan_in + fan_out))
pub fn xavier_normal<R: Rng>(shape: (usize, usize), fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f64> {
    let std = (2.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::<f64>::random_using(shape, StandardNormal, rng) * std
}

/// Index of the largest value; the first one wins on ties
pub fn argmax(values: ArrayView1<f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Repeat a per-example mask down `rows` rows so it lines up with `(rows, batch)` activations
pub fn expand_mask(mask: &Array1<f64>, rows: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, mask.len()), |(_, b)| mask[b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(arr1(&[0.1, 0.7, 0.2]).view()), 1);
        assert_eq!(argmax(arr1(&[3.0, 3.0, 1.0]).view()), 0);
        assert_eq!(argmax(arr1(&[-5.0, -1.0]).view()), 1);
    }

    #[test]
    fn test_xavier_is_seeded() {
        let a = xavier_normal((4, 3), 3, 4, &mut ChaCha8Rng::seed_from_u64(7));
        let b = xavier_normal((4, 3), 3, 4, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.shape(), &[4, 3]);
    }

    #[test]
    fn test_expand_mask() {
        let expanded = expand_mask(&arr1(&[1.0, 0.0, 1.0]), 2);
        assert_eq!(expanded.shape(), &[2, 3]);
        assert_eq!(expanded.row(1).to_vec(), vec![1.0, 0.0, 1.0]);
    }
}
