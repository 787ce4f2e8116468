//! Hyperparameter trials: train, evaluate and forecast once per configuration.

use serde::{Deserialize, Serialize};

use crate::config::LstmConfig;
use crate::data::parser::{CollectionParser, UciSequenceParser};
use crate::error::Result;
use crate::model::SequenceModel;

/// Outcome of one configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub config: LstmConfig,
    /// Held-out rows whose forecast class matched their label
    pub match_count: usize,
    pub total: usize,
    /// Accuracy reported by the evaluation pass over the test iterator
    pub accuracy: f64,
    /// Predicted class of every held-out row, in test order
    pub predictions: Vec<usize>,
}

impl TrialResult {
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.match_count as f64 / self.total as f64
        }
    }
}

/// Best trial seen so far, threaded through successive [`run_trial`] calls
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BestTrial {
    best: Option<TrialResult>,
}

impl BestTrial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `trial` if it matched strictly more rows than the current best
    pub fn record(self, trial: &TrialResult) -> Self {
        if self.best_match_count() >= trial.match_count && self.best.is_some() {
            return self;
        }
        BestTrial {
            best: Some(trial.clone()),
        }
    }

    pub fn best(&self) -> Option<&TrialResult> {
        self.best.as_ref()
    }

    pub fn best_match_count(&self) -> usize {
        self.best.as_ref().map_or(0, |t| t.match_count)
    }
}

/// Train and score one configuration on `lines`
///
/// Every held-out row is forecast and its summed class probabilities compared with
/// its label. Returns the trial and the updated best-so-far.
pub fn run_trial(config: &LstmConfig, lines: &[String], best: BestTrial) -> Result<(TrialResult, BestTrial)> {
    log::info!(
        "trial: batch {}, epochs {}, hidden {}, learning rate {}",
        config.mini_batch_size,
        config.num_epochs,
        config.hidden_states_size,
        config.learning_rate
    );

    let mut data = UciSequenceParser::new(config).parse_lines(lines)?;
    let mut model = SequenceModel::new(config.clone())?;
    model.configure()?;
    model.train(&mut data.train, &mut data.test)?;
    let evaluation = model.evaluate(&mut data.test)?;

    let mut predictions = Vec::with_capacity(data.test_pairs.len());
    let mut match_count = 0;
    for pair in &data.test_pairs {
        let forecast = model.forecast(&pair.features)?;
        let predicted = forecast.predicted_class();
        log::debug!("label {} forecast {} sums {:?}", pair.label, predicted, forecast.class_sums());
        if predicted == pair.label {
            match_count += 1;
        }
        predictions.push(predicted);
    }

    let trial = TrialResult {
        config: config.clone(),
        match_count,
        total: data.test_pairs.len(),
        accuracy: evaluation.accuracy(),
        predictions,
    };
    log::info!(
        "trial matched {}/{} forecasts, evaluation accuracy {:.4}",
        trial.match_count,
        trial.total,
        trial.accuracy
    );

    let best = best.record(&trial);
    Ok((trial, best))
}
