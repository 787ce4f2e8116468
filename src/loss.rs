use ndarray::{Array1, Array2, Axis};

/// Loss function trait for training sequence classifiers
///
/// Both methods take raw `(classes, batch)` logits for a single timestep and a
/// `(batch,)` mask; masked-out columns contribute neither loss nor gradient.
pub trait LossFunction {
    /// Summed loss over the unmasked columns
    fn compute_loss(&self, logits: &Array2<f64>, targets: &Array2<f64>, mask: &Array1<f64>) -> f64;

    /// Gradient of the summed loss with respect to the logits
    fn compute_gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>, mask: &Array1<f64>) -> Array2<f64>;
}

/// Multi-class cross-entropy over a softmax output
pub struct CrossEntropyLoss;

impl LossFunction for CrossEntropyLoss {
    fn compute_loss(&self, logits: &Array2<f64>, targets: &Array2<f64>, mask: &Array1<f64>) -> f64 {
        let probabilities = softmax(logits);
        let epsilon = 1e-15;
        let log_probs = probabilities.mapv(|p| (p + epsilon).ln());
        let per_column = (targets * &log_probs).sum_axis(Axis(0));
        -(per_column * mask).sum()
    }

    fn compute_gradient(&self, logits: &Array2<f64>, targets: &Array2<f64>, mask: &Array1<f64>) -> Array2<f64> {
        (softmax(logits) - targets) * &mask.view().insert_axis(Axis(0))
    }
}

/// Numerically stable softmax over each column
pub fn softmax(x: &Array2<f64>) -> Array2<f64> {
    let mut result = x.clone();
    for mut col in result.axis_iter_mut(Axis(1)) {
        let max_val = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        col.mapv_inplace(|v| (v - max_val).exp());
        let sum_exp = col.sum();
        col.mapv_inplace(|v| v / sum_exp);
    }
    result
}
