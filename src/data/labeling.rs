use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A raw feature row together with the label derived from its position
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureLabelPair {
    pub features: String,
    pub label: usize,
}

impl FeatureLabelPair {
    pub fn new(features: impl Into<String>, label: usize) -> Self {
        FeatureLabelPair {
            features: features.into(),
            label,
        }
    }
}

/// Pair every row with `index / group_size`.
///
/// The row count must split into whole groups and the number of groups must not
/// exceed `num_classes`; nothing is labeled otherwise.
pub fn assign_labels(lines: &[String], group_size: usize, num_classes: usize) -> Result<Vec<FeatureLabelPair>> {
    if group_size == 0 {
        return Err(Error::validation("group size must be positive"));
    }
    if lines.is_empty() {
        return Err(Error::validation("no rows to label"));
    }
    if lines.len() % group_size != 0 {
        return Err(Error::validation(format!(
            "{} rows do not split into groups of {}",
            lines.len(),
            group_size
        )));
    }
    let groups = lines.len() / group_size;
    if groups > num_classes {
        return Err(Error::validation(format!(
            "{} rows in groups of {} give {} labels, only {} classes configured",
            lines.len(),
            group_size,
            groups,
            num_classes
        )));
    }

    Ok(lines
        .iter()
        .enumerate()
        .map(|(i, line)| FeatureLabelPair::new(line.as_str(), i / group_size))
        .collect())
}

/// Fisher–Yates shuffle driven by a ChaCha8 stream seeded with `seed`
pub fn shuffle_pairs(pairs: &mut [FeatureLabelPair], seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    fn rows(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{} {} {}", i, i + 1, i + 2)).collect()
    }

    #[test]
    fn test_labels_follow_row_groups() {
        let lines = rows(600);
        let pairs = assign_labels(&lines, 100, 6).unwrap();
        for (i, pair) in pairs.iter().enumerate() {
            assert_eq!(pair.label, i / 100);
            assert_eq!(pair.features, lines[i]);
        }
        let distinct: BTreeSet<usize> = pairs.iter().map(|p| p.label).collect();
        assert_eq!(distinct, (0..6).collect());
    }

    #[test]
    fn test_fewer_groups_than_classes() {
        let pairs = assign_labels(&rows(300), 100, 6).unwrap();
        let distinct: BTreeSet<usize> = pairs.iter().map(|p| p.label).collect();
        assert_eq!(distinct, (0..3).collect());
    }

    #[test]
    fn test_partial_trailing_group_is_rejected() {
        assert!(matches!(assign_labels(&rows(650), 100, 7), Err(Error::Validation(_))));
    }

    #[test]
    fn test_too_many_groups_is_rejected() {
        assert!(matches!(assign_labels(&rows(700), 100, 6), Err(Error::Validation(_))));
    }

    #[test]
    fn test_zero_group_size_is_rejected() {
        assert!(assign_labels(&rows(6), 0, 6).is_err());
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let mut a = assign_labels(&rows(600), 100, 6).unwrap();
        let mut b = a.clone();
        shuffle_pairs(&mut a, 12345);
        shuffle_pairs(&mut b, 12345);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let original = assign_labels(&rows(600), 100, 6).unwrap();
        let mut shuffled = original.clone();
        shuffle_pairs(&mut shuffled, 12345);

        assert_eq!(shuffled.len(), original.len());
        assert_ne!(shuffled, original);

        let count = |pairs: &[FeatureLabelPair]| {
            let mut counts = HashMap::new();
            for pair in pairs {
                *counts.entry(pair.clone()).or_insert(0usize) += 1;
            }
            counts
        };
        assert_eq!(count(&shuffled), count(&original));
    }

    #[test]
    fn test_different_seeds_give_different_orders() {
        let mut a = assign_labels(&rows(600), 100, 6).unwrap();
        let mut b = a.clone();
        shuffle_pairs(&mut a, 12345);
        shuffle_pairs(&mut b, 54321);
        assert_ne!(a, b);
    }
}
