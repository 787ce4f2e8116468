use ndarray::{Array1, Array2, Axis};
use std::time::Instant;

use crate::config::{GradientNormalization, LstmConfig, CONTROL_CHART_LABELS};
use crate::data::iterator::{DataSet, SequenceDataSetIterator};
use crate::error::{Error, Result};
use crate::loss::{CrossEntropyLoss, LossFunction};
use crate::models::classifier::{ClassifierGradients, LSTMClassifier};
use crate::optimizers::{create_optimizer, Optimizer};

/// Configuration for training hyperparameters
#[derive(Clone, Debug)]
pub struct TrainingConfig {
    pub epochs: usize,
    /// Log the minibatch score every `score_every` iterations; 0 disables
    pub score_every: usize,
    pub gradient_normalization: GradientNormalization,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::from(&LstmConfig::default())
    }
}

impl From<&LstmConfig> for TrainingConfig {
    fn from(config: &LstmConfig) -> Self {
        TrainingConfig {
            epochs: config.num_epochs,
            score_every: config.score_every,
            gradient_normalization: config.gradient_normalization,
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    /// Mean minibatch score over the epoch
    pub train_score: f64,
    pub test_accuracy: Option<f64>,
    pub time_elapsed: f64,
}

/// Minibatch trainer for the sequence classifier with configurable loss and optimizer
pub struct LSTMTrainer<L: LossFunction, O: Optimizer> {
    pub classifier: LSTMClassifier,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
    iteration: usize,
}

impl<L: LossFunction, O: Optimizer> LSTMTrainer<L, O> {
    pub fn new(classifier: LSTMClassifier, loss_function: L, optimizer: O) -> Self {
        LSTMTrainer {
            classifier,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
            iteration: 0,
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of parameter updates performed so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// One forward/backward pass and parameter update on a minibatch
    ///
    /// Returns the score: the masked loss summed over steps and divided by the batch size.
    pub fn train_batch(&mut self, data: &DataSet) -> Result<f64> {
        let batch = data.num_examples();
        if batch == 0 {
            return Err(Error::validation("cannot train on an empty minibatch"));
        }
        if data.labels.shape()[1] != self.classifier.num_classes {
            return Err(Error::validation(format!(
                "labels have {} classes, classifier outputs {}",
                data.labels.shape()[1],
                self.classifier.num_classes
            )));
        }
        if data.features.shape()[1] != self.classifier.input_size() {
            return Err(Error::validation(format!(
                "features have {} channels, classifier expects {}",
                data.features.shape()[1],
                self.classifier.input_size()
            )));
        }

        let (logits, cache) = self.classifier.forward_with_cache(&data.features, Some(&data.features_mask));

        let scale = 1.0 / batch as f64;
        let mut total_loss = 0.0;
        let mut d_logits = Vec::with_capacity(logits.len());
        for (t, step_logits) in logits.iter().enumerate() {
            let targets: Array2<f64> = data.labels.index_axis(Axis(2), t).t().to_owned();
            let mask: Array1<f64> = data.labels_mask.column(t).to_owned();
            total_loss += self.loss_function.compute_loss(step_logits, &targets, &mask);
            d_logits.push(self.loss_function.compute_gradient(step_logits, &targets, &mask) * scale);
        }

        let mut gradients = self.classifier.backward(&d_logits, &cache);
        normalize_gradients(&mut gradients, self.config.gradient_normalization);
        self.classifier.update_parameters(&gradients, &mut self.optimizer);

        self.iteration += 1;
        let score = total_loss * scale;
        if self.config.score_every > 0 && self.iteration % self.config.score_every == 0 {
            log::info!("Score at iteration {} is {:.6}", self.iteration, score);
        }
        Ok(score)
    }

    /// Train for the configured number of epochs
    ///
    /// When `test` is given, the classifier is evaluated on it at the end of every epoch.
    pub fn fit(&mut self, train: &mut SequenceDataSetIterator, mut test: Option<&mut SequenceDataSetIterator>) -> Result<()> {
        log::info!(
            "Starting training for {} epochs ({} parameters)",
            self.config.epochs,
            self.classifier.num_parameters()
        );

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            let mut epoch_score = 0.0;
            let mut batches = 0;

            train.reset();
            while let Some(batch) = train.next_batch() {
                epoch_score += self.train_batch(&batch?)?;
                batches += 1;
            }
            train.reset();
            if batches > 0 {
                epoch_score /= batches as f64;
            }

            let test_accuracy = match test.as_deref_mut() {
                Some(test) => {
                    let evaluation = self.classifier.evaluate(test, &CONTROL_CHART_LABELS)?;
                    log::info!("Epoch {} evaluation:\n{}", epoch, evaluation.stats());
                    Some(evaluation.accuracy())
                }
                None => None,
            };

            let time_elapsed = start_time.elapsed().as_secs_f64();
            match test_accuracy {
                Some(accuracy) => log::info!(
                    "Epoch {}: Train Score: {:.6}, Test Accuracy: {:.4}, Time: {:.2}s",
                    epoch,
                    epoch_score,
                    accuracy,
                    time_elapsed
                ),
                None => log::info!("Epoch {}: Train Score: {:.6}, Time: {:.2}s", epoch, epoch_score, time_elapsed),
            }

            self.metrics_history.push(TrainingMetrics {
                epoch,
                train_score: epoch_score,
                test_accuracy,
                time_elapsed,
            });
        }

        log::info!("Training completed!");
        Ok(())
    }

    pub fn into_classifier(self) -> LSTMClassifier {
        self.classifier
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Apply the configured gradient normalization in place
pub fn normalize_gradients(gradients: &mut ClassifierGradients, mode: GradientNormalization) {
    match mode {
        GradientNormalization::None => {}
        GradientNormalization::ClipElementWiseAbsoluteValue(threshold) => {
            for matrix in gradients.matrices_mut() {
                matrix.mapv_inplace(|g| g.max(-threshold).min(threshold));
            }
        }
        GradientNormalization::ClipL2PerParamType(threshold) => {
            for matrix in gradients.matrices_mut() {
                clip_gradient_matrix(matrix, threshold);
            }
        }
    }
}

fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

/// Cross-entropy trainer with the updater, learning rate and schedule from `config`
pub fn create_classifier_trainer(
    classifier: LSTMClassifier,
    config: &LstmConfig,
) -> LSTMTrainer<CrossEntropyLoss, Box<dyn Optimizer>> {
    LSTMTrainer::new(classifier, CrossEntropyLoss, create_optimizer(config.updater, config.learning_rate))
        .with_config(TrainingConfig::from(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Updater;
    use crate::data::iterator::AlignmentMode;
    use crate::data::tensor::SequenceTensor;
    use crate::optimizers::SGD;

    fn toy_iterator() -> SequenceDataSetIterator {
        // rising rows are class 0, falling rows are class 1
        let rows = ["0 1 2 3", "1 2 3 4", "3 2 1 0", "4 3 2 1", "0 2 4", "4 2 0"];
        let features = SequenceTensor::tensorize(&rows).unwrap();
        let labels = SequenceTensor::from_labels(&[0, 0, 1, 1, 0, 1]);
        SequenceDataSetIterator::new(features, labels, 3, 2, AlignmentMode::AlignEnd).unwrap()
    }

    #[test]
    fn test_trainer_creation() {
        let trainer = create_classifier_trainer(LSTMClassifier::new(1, 3, 2, 123), &LstmConfig::default());
        assert_eq!(trainer.classifier.hidden_size(), 3);
        assert_eq!(trainer.iteration(), 0);
        assert_eq!(trainer.config.epochs, 28);
    }

    #[test]
    fn test_training_lowers_score() {
        let mut data = toy_iterator();
        let config = TrainingConfig {
            epochs: 40,
            score_every: 0,
            gradient_normalization: GradientNormalization::ClipElementWiseAbsoluteValue(0.5),
        };
        let defaults = LstmConfig::default().with_learning_rate(0.05);
        let mut trainer = create_classifier_trainer(LSTMClassifier::new(1, 8, 2, 123), &defaults).with_config(config);

        trainer.fit(&mut data, None).unwrap();

        let history = trainer.get_metrics_history();
        assert_eq!(history.len(), 40);
        assert!(history[39].train_score < history[0].train_score);
        assert_eq!(trainer.iteration(), 80);
    }

    #[test]
    fn test_fit_records_test_accuracy() {
        let mut train = toy_iterator();
        let mut test = toy_iterator();
        let config = TrainingConfig {
            epochs: 2,
            score_every: 1,
            gradient_normalization: GradientNormalization::None,
        };
        let mut trainer = LSTMTrainer::new(LSTMClassifier::new(1, 4, 2, 5), CrossEntropyLoss, SGD::new(0.1)).with_config(config);

        trainer.fit(&mut train, Some(&mut test)).unwrap();

        let latest = trainer.get_latest_metrics().unwrap();
        assert_eq!(latest.epoch, 1);
        let accuracy = latest.test_accuracy.unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_trainer_follows_configured_updater() {
        let config = LstmConfig::new(3, 2, 5, 4)
            .with_updater(Updater::Sgd)
            .with_learning_rate(0.1)
            .with_score_every(0);
        let mut data = toy_iterator();
        let mut trainer = create_classifier_trainer(LSTMClassifier::new(1, 4, 2, 5), &config);
        assert_eq!(trainer.config.epochs, 5);

        trainer.fit(&mut data, None).unwrap();

        let mut expected = LSTMTrainer::new(LSTMClassifier::new(1, 4, 2, 5), CrossEntropyLoss, SGD::new(0.1))
            .with_config(TrainingConfig::from(&config));
        expected.fit(&mut toy_iterator(), None).unwrap();
        let (a, b) = (trainer.classifier.output_layer.weight, expected.classifier.output_layer.weight);
        assert!((a - b).iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn test_rejects_wrong_class_count() {
        let mut data = toy_iterator();
        let batch = data.next().unwrap().unwrap();
        let mut trainer = create_classifier_trainer(LSTMClassifier::new(1, 3, 6, 123), &LstmConfig::default());
        assert!(matches!(trainer.train_batch(&batch), Err(Error::Validation(_))));
    }

    #[test]
    fn test_element_wise_clipping() {
        let classifier = LSTMClassifier::new(1, 2, 2, 1);
        let features = ndarray::Array3::from_elem((1, 1, 2), 10.0);
        let (logits, cache) = classifier.forward_with_cache(&features, None);
        let d_logits: Vec<Array2<f64>> = logits.iter().map(|l| Array2::from_elem(l.raw_dim(), 100.0)).collect();
        let mut gradients = classifier.backward(&d_logits, &cache);

        normalize_gradients(&mut gradients, GradientNormalization::ClipElementWiseAbsoluteValue(0.5));
        assert!(gradients.matrices_mut().iter().all(|m| m.iter().all(|g| g.abs() <= 0.5)));
    }

    #[test]
    fn test_l2_clipping_bounds_each_matrix() {
        let mut matrix = Array2::from_elem((2, 2), 3.0);
        clip_gradient_matrix(&mut matrix, 1.0);
        let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }
}
