use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::data::iterator::{DataSet, DataSetPreProcessor, SequenceDataSetIterator};
use crate::error::{Error, Result};

/// Lower bound applied to per-channel standard deviations
pub const MIN_STD: f64 = 1e-5;

/// Per-channel mean and standard deviation of the training features
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStatistics {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl NormalizationStatistics {
    pub fn channels(&self) -> usize {
        self.mean.len()
    }
}

/// Zero-mean, unit-variance standardization fitted once on a training iterator
#[derive(Clone, Debug, Default)]
pub struct NormalizerStandardize {
    stats: Option<NormalizationStatistics>,
}

impl NormalizerStandardize {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a normalizer from previously computed statistics
    pub fn from_statistics(stats: NormalizationStatistics) -> Self {
        NormalizerStandardize { stats: Some(stats) }
    }

    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    pub fn statistics(&self) -> Option<&NormalizationStatistics> {
        self.stats.as_ref()
    }

    /// Collect statistics over every unmasked (example, timestep) of `data`.
    ///
    /// Batches are read without pre-processing and the iterator is rewound before
    /// and after, so the caller can start training from the first batch.
    pub fn fit(&mut self, data: &mut SequenceDataSetIterator) -> Result<()> {
        if self.is_fitted() {
            return Err(Error::validation("normalizer statistics are already fitted"));
        }

        data.reset();
        let mut count: Vec<f64> = Vec::new();
        let mut mean: Vec<f64> = Vec::new();
        let mut m2: Vec<f64> = Vec::new();

        while let Some(batch) = data.next_unprocessed() {
            let batch = batch?;
            let channels = batch.features.shape()[1];
            if mean.is_empty() {
                count = vec![0.0; channels];
                mean = vec![0.0; channels];
                m2 = vec![0.0; channels];
            } else if mean.len() != channels {
                data.reset();
                return Err(Error::validation("channel count changes between minibatches"));
            }

            for ((b, c, t), &value) in batch.features.indexed_iter() {
                if batch.features_mask[[b, t]] == 0.0 {
                    continue;
                }
                // Welford update
                count[c] += 1.0;
                let delta = value - mean[c];
                mean[c] += delta / count[c];
                m2[c] += delta * (value - mean[c]);
            }
        }
        data.reset();

        if count.is_empty() || count.iter().any(|&n| n == 0.0) {
            return Err(Error::validation("no observed values to fit normalization statistics"));
        }

        let std = m2
            .iter()
            .zip(count.iter())
            .enumerate()
            .map(|(c, (&m2, &n))| {
                let std = (m2 / n).sqrt();
                if std < MIN_STD {
                    log::warn!("channel {} has near-zero variance, clamping std to {}", c, MIN_STD);
                    MIN_STD
                } else {
                    std
                }
            })
            .collect::<Vec<f64>>();

        log::info!("fitted standardization: mean {:?}, std {:?}", mean, std);
        self.stats = Some(NormalizationStatistics { mean, std });
        Ok(())
    }

    /// Standardize `(batch, channels, timesteps)` features; masked-out steps are set to zero
    pub fn transform_features(&self, features: &mut Array3<f64>, mask: Option<&Array2<f64>>) -> Result<()> {
        let stats = self
            .stats
            .as_ref()
            .ok_or_else(|| Error::validation("normalizer used before fit"))?;
        let channels = features.shape()[1];
        if channels != stats.channels() {
            return Err(Error::validation(format!(
                "input has {} channels, normalizer was fitted on {}",
                channels,
                stats.channels()
            )));
        }
        if let Some(mask) = mask {
            if mask.dim() != (features.shape()[0], features.shape()[2]) {
                return Err(Error::validation("feature mask shape does not match features"));
            }
        }

        for (c, mut channel) in features.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (stats.mean[c], stats.std[c]);
            for ((b, t), value) in channel.indexed_iter_mut() {
                let observed = mask.map_or(true, |m| m[[b, t]] != 0.0);
                *value = if observed { (*value - mean) / std } else { 0.0 };
            }
        }
        Ok(())
    }

    pub fn transform(&self, data: &mut DataSet) -> Result<()> {
        self.transform_features(&mut data.features, Some(&data.features_mask))
    }
}

impl DataSetPreProcessor for NormalizerStandardize {
    fn pre_process(&self, data: &mut DataSet) -> Result<()> {
        self.transform(data)
    }
}
