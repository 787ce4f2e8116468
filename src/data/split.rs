use serde::{Deserialize, Serialize};

use crate::data::labeling::FeatureLabelPair;
use crate::error::{Error, Result};

/// How the shuffled pairs are divided into train and test views
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// Every pair lands in both views; test metrics then measure fit, not generalization
    Duplicate,
    /// The last `test_fraction` of the shuffled pairs is held out
    Holdout { test_fraction: f64 },
    /// Fold `fold` of `folds` contiguous folds is held out
    KFold { folds: usize, fold: usize },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::Holdout { test_fraction: 0.2 }
    }
}

impl SplitPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            SplitPolicy::Duplicate => Ok(()),
            SplitPolicy::Holdout { test_fraction } => {
                if test_fraction > 0.0 && test_fraction < 1.0 {
                    Ok(())
                } else {
                    Err(Error::validation(format!("test fraction {} must be in (0, 1)", test_fraction)))
                }
            }
            SplitPolicy::KFold { folds, fold } => {
                if folds < 2 {
                    Err(Error::validation("k-fold split needs at least 2 folds"))
                } else if fold >= folds {
                    Err(Error::validation(format!("fold {} out of range for {} folds", fold, folds)))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Index ranges `(train, test)`; the two sets are disjoint except under `Duplicate`
    pub fn indices(&self, len: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        self.validate()?;
        let (test_start, test_end) = match *self {
            SplitPolicy::Duplicate => return Ok(((0..len).collect(), (0..len).collect())),
            SplitPolicy::Holdout { test_fraction } => {
                let test_len = ((len as f64) * test_fraction).round() as usize;
                (len - test_len.min(len), len)
            }
            SplitPolicy::KFold { folds, fold } => {
                if len < folds {
                    return Err(Error::validation(format!("{} pairs cannot fill {} folds", len, folds)));
                }
                (fold * len / folds, (fold + 1) * len / folds)
            }
        };

        let train = (0..test_start).chain(test_end..len).collect::<Vec<_>>();
        let test = (test_start..test_end).collect::<Vec<_>>();
        if train.is_empty() || test.is_empty() {
            return Err(Error::validation(format!("{:?} leaves an empty view for {} pairs", self, len)));
        }
        Ok((train, test))
    }

    /// Materialize the train and test views
    pub fn split(&self, pairs: &[FeatureLabelPair]) -> Result<(Vec<FeatureLabelPair>, Vec<FeatureLabelPair>)> {
        let (train, test) = self.indices(pairs.len())?;
        let pick = |indices: &[usize]| indices.iter().map(|&i| pairs[i].clone()).collect::<Vec<_>>();
        Ok((pick(&train), pick(&test)))
    }
}
