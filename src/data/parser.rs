use crate::config::LstmConfig;
use crate::data::iterator::{AlignmentMode, SequenceDataSetIterator};
use crate::data::labeling::{assign_labels, shuffle_pairs, FeatureLabelPair};
use crate::data::source::{read_lines, DataSource};
use crate::data::split::SplitPolicy;
use crate::data::tensor::SequenceTensor;
use crate::error::Result;

/// Labeled pairs plus the train and test iterators built from them
pub struct ParsedDataset {
    /// Shuffled pairs; the source of truth for both views
    pub pairs: Vec<FeatureLabelPair>,
    pub train: SequenceDataSetIterator,
    pub test: SequenceDataSetIterator,
    /// Pairs behind `test`, in iteration order
    pub test_pairs: Vec<FeatureLabelPair>,
}

impl ParsedDataset {
    pub fn feature_label_pairs(&self) -> &[FeatureLabelPair] {
        &self.pairs
    }
}

/// Turns a collection of raw rows into labeled, batched sequence data
pub trait CollectionParser {
    fn parse_lines(&self, lines: &[String]) -> Result<ParsedDataset>;

    /// Fetch rows from `source` (or the fallback) and parse them
    fn parse(&self, source: Option<&DataSource>) -> Result<ParsedDataset> {
        let lines = read_lines(source)?;
        self.parse_lines(&lines)
    }
}

/// Parser for the UCI synthetic control chart layout: rows grouped by class in order.
///
/// The file holds 600 charts of 60 observations each; rows 1-100 are Normal,
/// 101-200 Cyclic, 201-300 Increasing trend, 301-400 Decreasing trend,
/// 401-500 Upward shift and 501-600 Downward shift.
#[derive(Clone, Debug)]
pub struct UciSequenceParser {
    group_size: usize,
    num_classes: usize,
    mini_batch_size: usize,
    shuffle_seed: u64,
    split: SplitPolicy,
}

impl UciSequenceParser {
    pub fn new(config: &LstmConfig) -> Self {
        UciSequenceParser {
            group_size: config.group_size,
            num_classes: config.num_label_classes,
            mini_batch_size: config.mini_batch_size,
            shuffle_seed: config.shuffle_seed,
            split: config.split,
        }
    }

    fn build_iterator(&self, pairs: &[FeatureLabelPair]) -> Result<SequenceDataSetIterator> {
        let rows: Vec<&str> = pairs.iter().map(|p| p.features.as_str()).collect();
        let labels: Vec<usize> = pairs.iter().map(|p| p.label).collect();
        SequenceDataSetIterator::new(
            SequenceTensor::tensorize(&rows)?,
            SequenceTensor::from_labels(&labels),
            self.mini_batch_size,
            self.num_classes,
            AlignmentMode::AlignEnd,
        )
    }
}

impl CollectionParser for UciSequenceParser {
    fn parse_lines(&self, lines: &[String]) -> Result<ParsedDataset> {
        let mut pairs = assign_labels(lines, self.group_size, self.num_classes)?;
        shuffle_pairs(&mut pairs, self.shuffle_seed);

        let (train_pairs, test_pairs) = self.split.split(&pairs)?;
        log::info!(
            "{:?} split: {} train / {} test pairs",
            self.split,
            train_pairs.len(),
            test_pairs.len()
        );

        let train = self.build_iterator(&train_pairs)?;
        let test = self.build_iterator(&test_pairs)?;
        Ok(ParsedDataset {
            pairs,
            train,
            test,
            test_pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn six_rows() -> Vec<String> {
        (0..6)
            .map(|i| format!("{} {} {}", 3 * i + 1, 3 * i + 2, 3 * i + 3))
            .collect()
    }

    fn six_row_config(split: SplitPolicy) -> LstmConfig {
        LstmConfig::new(4, 6, 1, 4).with_group_size(1).with_split(split)
    }

    #[test]
    fn test_six_row_scenario_is_reproducible() {
        let parser = UciSequenceParser::new(&six_row_config(SplitPolicy::Duplicate));
        let data = parser.parse_lines(&six_rows()).unwrap();

        let labels: Vec<usize> = data.pairs.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![2, 3, 1, 5, 0, 4]);
        let features: Vec<&str> = data.pairs.iter().map(|p| p.features.as_str()).collect();
        assert_eq!(features, vec!["7 8 9", "10 11 12", "4 5 6", "16 17 18", "1 2 3", "13 14 15"]);

        let again = parser.parse_lines(&six_rows()).unwrap();
        assert_eq!(again.pairs, data.pairs);
    }

    #[test]
    fn test_duplicate_split_shares_all_pairs() {
        let parser = UciSequenceParser::new(&six_row_config(SplitPolicy::Duplicate));
        let data = parser.parse_lines(&six_rows()).unwrap();
        assert_eq!(data.train.total_examples(), 6);
        assert_eq!(data.test.total_examples(), 6);
        assert_eq!(data.train.num_batches(), 2);
    }

    #[test]
    fn test_holdout_split_sizes() {
        let rows: Vec<String> = (0..600).map(|i| format!("{} {}", i, i + 1)).collect();
        let parser = UciSequenceParser::new(&LstmConfig::default());
        let data = parser.parse_lines(&rows).unwrap();
        assert_eq!(data.pairs.len(), 600);
        assert_eq!(data.train.total_examples(), 480);
        assert_eq!(data.test.total_examples(), 120);
        assert_eq!(data.test_pairs[..], data.pairs[480..]);
    }

    #[test]
    fn test_malformed_row_fails_parse() {
        let mut rows = six_rows();
        rows[4] = "13 fourteen 15".to_string();
        let parser = UciSequenceParser::new(&six_row_config(SplitPolicy::Duplicate));
        assert!(matches!(parser.parse_lines(&rows), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_row_count_mismatch_is_validation_error() {
        let parser = UciSequenceParser::new(&LstmConfig::default());
        assert!(matches!(parser.parse_lines(&six_rows()), Err(Error::Validation(_))));
    }
}
