use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::data::split::SplitPolicy;
use crate::error::{Error, Result};

/// Class names of the synthetic control chart dataset, index-aligned with labels
pub const CONTROL_CHART_LABELS: [&str; 6] = [
    "Normal",
    "Cyclic",
    "Increasing Trend",
    "Decreasing Trend",
    "UpwardShift",
    "DownwardShift",
];

/// Gradient normalization applied before every parameter update
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientNormalization {
    None,
    /// Clamp every gradient element to `[-t, t]`
    ClipElementWiseAbsoluteValue(f64),
    /// Rescale each parameter matrix whose L2 norm exceeds `t`
    ClipL2PerParamType(f64),
}

/// Parameter update rule used when training
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Updater {
    Sgd,
    Adam,
    #[default]
    Nadam,
}

/// Hyperparameters and dataset layout for one training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    pub mini_batch_size: usize,
    pub num_label_classes: usize,
    pub num_epochs: usize,
    pub hidden_states_size: usize,
    pub learning_rate: f64,
    /// Seed for weight initialization
    pub seed: u64,
    /// Seed for the feature/label pair shuffle
    pub shuffle_seed: u64,
    /// Consecutive rows sharing one label
    pub group_size: usize,
    pub gradient_normalization: GradientNormalization,
    pub updater: Updater,
    /// Log the minibatch score every `score_every` iterations; 0 disables
    pub score_every: usize,
    pub split: SplitPolicy,
}

impl Default for LstmConfig {
    fn default() -> Self {
        LstmConfig {
            mini_batch_size: 20,
            num_label_classes: CONTROL_CHART_LABELS.len(),
            num_epochs: 28,
            hidden_states_size: 100,
            learning_rate: 0.001,
            seed: 123,
            shuffle_seed: 12345,
            group_size: 100,
            gradient_normalization: GradientNormalization::ClipElementWiseAbsoluteValue(0.5),
            updater: Updater::Nadam,
            score_every: 20,
            split: SplitPolicy::default(),
        }
    }
}

impl LstmConfig {
    pub fn new(mini_batch_size: usize, num_label_classes: usize, num_epochs: usize, hidden_states_size: usize) -> Self {
        LstmConfig {
            mini_batch_size,
            num_label_classes,
            num_epochs,
            hidden_states_size,
            ..Default::default()
        }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shuffle_seed(mut self, shuffle_seed: u64) -> Self {
        self.shuffle_seed = shuffle_seed;
        self
    }

    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_gradient_normalization(mut self, gradient_normalization: GradientNormalization) -> Self {
        self.gradient_normalization = gradient_normalization;
        self
    }

    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = updater;
        self
    }

    pub fn with_score_every(mut self, score_every: usize) -> Self {
        self.score_every = score_every;
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    /// Reject configurations that cannot produce a trainable network
    pub fn validate(&self) -> Result<()> {
        if self.mini_batch_size == 0 {
            return Err(Error::validation("mini_batch_size must be positive"));
        }
        if self.num_label_classes < 2 {
            return Err(Error::validation("num_label_classes must be at least 2"));
        }
        if self.num_epochs == 0 {
            return Err(Error::validation("num_epochs must be positive"));
        }
        if self.hidden_states_size == 0 {
            return Err(Error::validation("hidden_states_size must be positive"));
        }
        if self.group_size == 0 {
            return Err(Error::validation("group_size must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::validation(format!("learning_rate {} must be positive", self.learning_rate)));
        }
        match self.gradient_normalization {
            GradientNormalization::ClipElementWiseAbsoluteValue(t) | GradientNormalization::ClipL2PerParamType(t)
                if !(t > 0.0 && t.is_finite()) =>
            {
                return Err(Error::validation("gradient normalization threshold must be positive"));
            }
            _ => {}
        }
        self.split.validate()
    }

    /// Load a configuration from JSON; absent fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: LstmConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
