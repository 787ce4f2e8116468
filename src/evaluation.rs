//! Classification metrics accumulated over masked sequence outputs.

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::argmax;

/// Confusion-matrix based evaluation of a sequence classifier
///
/// Rows of the confusion matrix are actual classes, columns are predicted classes.
/// Only timesteps whose label mask is set are counted, so end-aligned sequences
/// contribute exactly one prediction each.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    class_names: Vec<String>,
    confusion: Vec<Vec<usize>>,
}

impl Evaluation {
    pub fn new<S: AsRef<str>>(class_names: &[S]) -> Self {
        let n = class_names.len();
        Evaluation {
            class_names: class_names.iter().map(|s| s.as_ref().to_string()).collect(),
            confusion: vec![vec![0; n]; n],
        }
    }

    /// Evaluation with numbered class names
    pub fn with_classes(num_classes: usize) -> Self {
        let names: Vec<String> = (0..num_classes).map(|c| c.to_string()).collect();
        Self::new(&names)
    }

    /// Count one prediction per labeled timestep
    ///
    /// `labels` and `predictions` are `(batch, classes, timesteps)`, `mask` is `(batch, timesteps)`.
    pub fn eval(&mut self, labels: &Array3<f64>, predictions: &Array3<f64>, mask: Option<&Array2<f64>>) -> Result<()> {
        if labels.shape() != predictions.shape() {
            return Err(Error::validation(format!(
                "label shape {:?} does not match prediction shape {:?}",
                labels.shape(),
                predictions.shape()
            )));
        }
        let (batch, classes, steps) = labels.dim();
        if classes != self.num_classes() {
            return Err(Error::validation(format!(
                "evaluation has {} classes, outputs have {}",
                self.num_classes(),
                classes
            )));
        }
        if let Some(mask) = mask {
            if mask.dim() != (batch, steps) {
                return Err(Error::validation("label mask shape does not match labels"));
            }
        }

        for b in 0..batch {
            for t in 0..steps {
                if mask.map_or(false, |m| m[[b, t]] == 0.0) {
                    continue;
                }
                let actual = labels.index_axis(Axis(0), b);
                let predicted = predictions.index_axis(Axis(0), b);
                let actual = argmax(actual.index_axis(Axis(1), t));
                let predicted = argmax(predicted.index_axis(Axis(1), t));
                self.confusion[actual][predicted] += 1;
            }
        }
        Ok(())
    }

    /// Record a single actual/predicted pair
    pub fn record(&mut self, actual: usize, predicted: usize) -> Result<()> {
        let n = self.num_classes();
        if actual >= n || predicted >= n {
            return Err(Error::validation(format!("class index out of range for {} classes", n)));
        }
        self.confusion[actual][predicted] += 1;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn confusion_matrix(&self) -> &[Vec<usize>] {
        &self.confusion
    }

    /// Total number of counted predictions
    pub fn total(&self) -> usize {
        self.confusion.iter().map(|row| row.iter().sum::<usize>()).sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes()).map(|c| self.confusion[c][c]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    fn true_positives(&self, class: usize) -> usize {
        self.confusion[class][class]
    }

    fn predicted_count(&self, class: usize) -> usize {
        self.confusion.iter().map(|row| row[class]).sum()
    }

    fn actual_count(&self, class: usize) -> usize {
        self.confusion[class].iter().sum()
    }

    /// Precision of one class; 0 when the class was never predicted
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.predicted_count(class))
    }

    /// Recall of one class; 0 when the class never occurred
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.actual_count(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let (p, r) = (self.precision(class), self.recall(class));
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Macro-averaged precision over classes that were predicted or occurred
    pub fn macro_precision(&self) -> f64 {
        self.macro_average(|c| self.precision(c))
    }

    pub fn macro_recall(&self) -> f64 {
        self.macro_average(|c| self.recall(c))
    }

    pub fn macro_f1(&self) -> f64 {
        self.macro_average(|c| self.f1(c))
    }

    fn macro_average<F: Fn(usize) -> f64>(&self, metric: F) -> f64 {
        let active: Vec<usize> = (0..self.num_classes())
            .filter(|&c| self.actual_count(c) + self.predicted_count(c) > 0)
            .collect();
        if active.is_empty() {
            return 0.0;
        }
        active.iter().map(|&c| metric(c)).sum::<f64>() / active.len() as f64
    }

    /// Human readable summary with per-class counts and the confusion matrix
    pub fn stats(&self) -> String {
        self.to_string()
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========================Evaluation Metrics========================")?;
        writeln!(f, " # of classes:    {}", self.num_classes())?;
        writeln!(f, " Examples:        {}", self.total())?;
        writeln!(f, " Accuracy:        {:.4}", self.accuracy())?;
        writeln!(f, " Precision:       {:.4}", self.macro_precision())?;
        writeln!(f, " Recall:          {:.4}", self.macro_recall())?;
        writeln!(f, " F1 Score:        {:.4}", self.macro_f1())?;
        writeln!(f)?;

        for (actual, name) in self.class_names.iter().enumerate() {
            for (predicted, &count) in self.confusion[actual].iter().enumerate() {
                if count > 0 {
                    writeln!(
                        f,
                        "Examples labeled as {} classified by model as {}: {} times",
                        name, self.class_names[predicted], count
                    )?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "=========================Confusion Matrix=========================")?;
        write!(f, "     ")?;
        for c in 0..self.num_classes() {
            write!(f, "{:>5}", c)?;
        }
        writeln!(f)?;
        for (c, row) in self.confusion.iter().enumerate() {
            write!(f, "{:>5}", c)?;
            for count in row {
                write!(f, "{:>5}", count)?;
            }
            writeln!(f, " | {} = {}", c, self.class_names[c])?;
        }
        write!(f, "==================================================================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn one_hot(classes: &[usize], num_classes: usize) -> Array3<f64> {
        let mut out = Array3::zeros((classes.len(), num_classes, 1));
        for (b, &c) in classes.iter().enumerate() {
            out[[b, c, 0]] = 1.0;
        }
        out
    }

    #[test]
    fn test_perfect_predictions() {
        let mut evaluation = Evaluation::with_classes(3);
        let labels = one_hot(&[0, 1, 2], 3);
        evaluation.eval(&labels, &labels, None).unwrap();

        assert_eq!(evaluation.total(), 3);
        assert!((evaluation.accuracy() - 1.0).abs() < 1e-12);
        assert!((evaluation.macro_f1() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_from_confusion() {
        let mut evaluation = Evaluation::new(&["a", "b"]);
        let labels = one_hot(&[0, 0, 1, 1], 2);
        let predictions = one_hot(&[0, 1, 1, 1], 2);
        evaluation.eval(&labels, &predictions, None).unwrap();

        assert_eq!(evaluation.confusion_matrix(), &[vec![1usize, 1], vec![0, 2]]);
        assert!((evaluation.accuracy() - 0.75).abs() < 1e-12);
        assert!((evaluation.precision(1) - 2.0 / 3.0).abs() < 1e-12);
        assert!((evaluation.recall(0) - 0.5).abs() < 1e-12);
        assert!((evaluation.f1(0) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_steps_are_skipped() {
        let mut evaluation = Evaluation::with_classes(2);
        let mut labels = Array3::zeros((1, 2, 3));
        labels[[0, 1, 2]] = 1.0;
        let predictions = Array3::from_elem((1, 2, 3), 0.5);
        let mask = ndarray::arr2(&[[0.0, 0.0, 1.0]]);
        evaluation.eval(&labels, &predictions, Some(&mask)).unwrap();

        assert_eq!(evaluation.total(), 1);
        // tie resolves to class 0
        assert_eq!(evaluation.confusion_matrix()[1][0], 1);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let mut evaluation = Evaluation::with_classes(2);
        let labels = one_hot(&[0], 2);
        let predictions = one_hot(&[0, 1], 2);
        assert!(evaluation.eval(&labels, &predictions, None).is_err());
    }

    #[test]
    fn test_stats_mentions_class_names() {
        let mut evaluation = Evaluation::new(&["Normal", "Cyclic"]);
        evaluation.record(1, 0).unwrap();
        let stats = evaluation.stats();
        assert!(stats.contains("Examples labeled as Cyclic classified by model as Normal: 1 times"));
        assert!(stats.contains("Accuracy:"));
    }
}
