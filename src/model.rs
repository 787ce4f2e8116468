//! Training, evaluation and forecasting driver.
//!
//! [`SequenceModel`] walks through `Constructed → Configured → Trained → Evaluated`.
//! Every operation checks the state it needs and fails with a validation error
//! instead of touching a network that does not exist yet.

use ndarray::{Array2, Array3, Axis};
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use crate::config::{LstmConfig, CONTROL_CHART_LABELS};
use crate::data::iterator::{DataSetPreProcessor, SequenceDataSetIterator};
use crate::data::normalize::NormalizerStandardize;
use crate::data::tensor::parse_row;
use crate::error::{Error, Result};
use crate::evaluation::Evaluation;
use crate::models::classifier::LSTMClassifier;
use crate::persistence::ModelPersistence;
use crate::training::{create_classifier_trainer, TrainingMetrics};
use crate::utils::argmax;

/// Observation channels per timestep; control charts are univariate
pub const INPUT_CHANNELS: usize = 1;

/// Lifecycle of a [`SequenceModel`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Constructed,
    Configured,
    Trained,
    Evaluated,
}

impl ModelState {
    fn has_trained_network(self) -> bool {
        matches!(self, ModelState::Trained | ModelState::Evaluated)
    }
}

/// Per-timestep class probabilities for one forecast sequence
#[derive(Clone, Debug, PartialEq)]
pub struct Forecast {
    /// `(classes, timesteps)`
    probabilities: Array2<f64>,
}

impl Forecast {
    pub fn probabilities(&self) -> &Array2<f64> {
        &self.probabilities
    }

    pub fn num_timesteps(&self) -> usize {
        self.probabilities.ncols()
    }

    /// Probability mass of each class summed over all timesteps
    pub fn class_sums(&self) -> Vec<f64> {
        self.probabilities.sum_axis(Axis(1)).to_vec()
    }

    /// Class with the largest summed probability
    pub fn predicted_class(&self) -> usize {
        argmax(self.probabilities.sum_axis(Axis(1)).view())
    }

    /// Class probabilities at the last timestep
    pub fn final_step(&self) -> Vec<f64> {
        match self.num_timesteps() {
            0 => Vec::new(),
            n => self.probabilities.column(n - 1).to_vec(),
        }
    }
}

/// LSTM classifier together with the normalizer its inputs were standardized with
pub struct SequenceModel {
    config: LstmConfig,
    state: ModelState,
    classifier: Option<LSTMClassifier>,
    normalizer: Option<Rc<NormalizerStandardize>>,
    metrics_history: Vec<TrainingMetrics>,
    last_evaluation: Option<Evaluation>,
}

impl SequenceModel {
    pub fn new(config: LstmConfig) -> Result<Self> {
        config.validate()?;
        Ok(SequenceModel {
            config,
            state: ModelState::Constructed,
            classifier: None,
            normalizer: None,
            metrics_history: Vec::new(),
            last_evaluation: None,
        })
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    pub fn classifier(&self) -> Option<&LSTMClassifier> {
        self.classifier.as_ref()
    }

    pub fn normalizer(&self) -> Option<&NormalizerStandardize> {
        self.normalizer.as_deref()
    }

    pub fn metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }

    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.last_evaluation.as_ref()
    }

    /// Build the LSTM + softmax network from the configuration
    pub fn configure(&mut self) -> Result<()> {
        if self.state != ModelState::Constructed {
            return Err(Error::validation(format!("cannot configure a model in state {:?}", self.state)));
        }
        let classifier = self.build_classifier();
        log::info!(
            "configured LSTM({} -> {}) + softmax({}) with {} parameters, seed {}",
            INPUT_CHANNELS,
            self.config.hidden_states_size,
            self.config.num_label_classes,
            classifier.num_parameters(),
            self.config.seed
        );
        self.classifier = Some(classifier);
        self.state = ModelState::Configured;
        Ok(())
    }

    /// Fit the normalizer on `train`, attach it to both iterators and train for the configured epochs
    ///
    /// The test iterator is scored at the end of every epoch.
    pub fn train(&mut self, train: &mut SequenceDataSetIterator, test: &mut SequenceDataSetIterator) -> Result<()> {
        if self.state != ModelState::Configured {
            return Err(Error::validation(format!(
                "training requires a configured, untrained network (state {:?})",
                self.state
            )));
        }
        let classifier = self
            .classifier
            .take()
            .ok_or_else(|| Error::validation("no network to train"))?;

        let mut normalizer = NormalizerStandardize::new();
        if let Err(e) = normalizer.fit(train) {
            self.classifier = Some(classifier);
            return Err(e);
        }
        let normalizer = Rc::new(normalizer);
        let pre_processor: Rc<dyn DataSetPreProcessor> = normalizer.clone();
        train.set_pre_processor(pre_processor.clone());
        test.set_pre_processor(pre_processor);

        let mut trainer = create_classifier_trainer(classifier, &self.config);

        let start = Instant::now();
        let result = trainer.fit(train, Some(test));
        log::info!("Fit took {} ms", start.elapsed().as_millis());

        if let Err(e) = result {
            // partially updated weights are discarded
            log::warn!("training failed, reinitializing the network: {}", e);
            self.classifier = Some(self.build_classifier());
            self.metrics_history.clear();
            return Err(e);
        }
        self.metrics_history = trainer.get_metrics_history().to_vec();
        self.classifier = Some(trainer.into_classifier());

        self.normalizer = Some(normalizer);
        self.state = ModelState::Trained;
        Ok(())
    }

    /// Score the trained network on `test`
    pub fn evaluate(&mut self, test: &mut SequenceDataSetIterator) -> Result<Evaluation> {
        let classifier = self.trained_classifier()?;
        if !test.has_pre_processor() {
            if let Some(normalizer) = &self.normalizer {
                let pre_processor: Rc<dyn DataSetPreProcessor> = normalizer.clone();
                test.set_pre_processor(pre_processor);
            }
        }

        let evaluation = classifier.evaluate(test, &CONTROL_CHART_LABELS)?;
        log::info!("Evaluation:\n{}", evaluation.stats());
        self.last_evaluation = Some(evaluation.clone());
        self.state = ModelState::Evaluated;
        Ok(evaluation)
    }

    /// Class probabilities for every timestep of one whitespace-separated row
    ///
    /// The row is standardized with the statistics fitted during training.
    pub fn forecast(&self, text: &str) -> Result<Forecast> {
        let classifier = self.trained_classifier()?;
        if text.trim().is_empty() {
            return Err(Error::validation("forecast input is blank"));
        }
        let normalizer = self
            .normalizer
            .as_ref()
            .ok_or_else(|| Error::validation("forecast requires fitted normalization statistics"))?;

        let values = parse_row(text)?;
        let mut features = Array3::from_shape_vec((1, INPUT_CHANNELS, values.len()), values)
            .map_err(|e| Error::validation(e.to_string()))?;
        normalizer.transform_features(&mut features, None)?;

        let probabilities = classifier.output(&features, None).index_axis_move(Axis(0), 0);
        Ok(Forecast { probabilities })
    }

    /// Save the trained network, its normalization statistics and the configuration
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let classifier = self.trained_classifier()?;
        let saved = ModelPersistence::create_saved_model(
            classifier,
            self.normalizer.as_ref().and_then(|n| n.statistics().cloned()),
            &self.config,
            self.metrics_history.last().map(|m| m.train_score),
            self.last_evaluation.as_ref().map(|e| e.accuracy()),
            None,
        );
        ModelPersistence::save(&saved, path)
    }

    fn build_classifier(&self) -> LSTMClassifier {
        LSTMClassifier::new(
            INPUT_CHANNELS,
            self.config.hidden_states_size,
            self.config.num_label_classes,
            self.config.seed,
        )
    }

    /// Restore a previously saved model in the `Trained` state
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let saved = ModelPersistence::load(path)?;
        let stats = saved
            .normalization
            .ok_or_else(|| Error::Serialization("saved model has no normalization statistics".to_string()))?;
        let classifier = LSTMClassifier::try_from(saved.classifier)?;
        if classifier.input_size() != stats.channels() {
            return Err(Error::Serialization(format!(
                "network expects {} channels, statistics cover {}",
                classifier.input_size(),
                stats.channels()
            )));
        }
        log::info!(
            "loaded {} v{} created {}",
            saved.metadata.model_name,
            saved.metadata.version,
            saved.metadata.created_at
        );

        Ok(SequenceModel {
            config: saved.config,
            state: ModelState::Trained,
            classifier: Some(classifier),
            normalizer: Some(Rc::new(NormalizerStandardize::from_statistics(stats))),
            metrics_history: Vec::new(),
            last_evaluation: None,
        })
    }

    fn trained_classifier(&self) -> Result<&LSTMClassifier> {
        if !self.state.has_trained_network() {
            return Err(Error::validation(format!("no trained network (state {:?})", self.state)));
        }
        self.classifier
            .as_ref()
            .ok_or_else(|| Error::validation("no trained network"))
    }
}
