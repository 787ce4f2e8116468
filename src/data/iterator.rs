use ndarray::{Array2, Array3};
use std::rc::Rc;

use crate::data::tensor::SequenceTensor;
use crate::error::{Error, Result};

/// One minibatch of masked, aligned sequences
///
/// `features` is `(batch, channels, timesteps)`, `labels` is `(batch, classes, timesteps)`
/// with one-hot columns, and each mask is `(batch, timesteps)` with 1.0 on real steps.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSet {
    pub features: Array3<f64>,
    pub labels: Array3<f64>,
    pub features_mask: Array2<f64>,
    pub labels_mask: Array2<f64>,
}

impl DataSet {
    pub fn num_examples(&self) -> usize {
        self.features.shape()[0]
    }

    pub fn timesteps(&self) -> usize {
        self.features.shape()[2]
    }
}

/// Transformation applied to every batch an iterator hands out
pub trait DataSetPreProcessor {
    fn pre_process(&self, data: &mut DataSet) -> Result<()>;
}

/// How sequences of different lengths share the batch time axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignmentMode {
    /// Pad at the end so every sequence starts at step 0
    AlignStart,
    /// Pad at the start so every sequence ends at the last step
    AlignEnd,
    /// Require features and labels of identical length
    EqualLength,
}

/// Restartable minibatch iterator over aligned feature and label tensors
pub struct SequenceDataSetIterator {
    features: SequenceTensor,
    labels: SequenceTensor,
    batch_size: usize,
    num_classes: usize,
    alignment: AlignmentMode,
    cursor: usize,
    pre_processor: Option<Rc<dyn DataSetPreProcessor>>,
}

impl SequenceDataSetIterator {
    pub fn new(
        features: SequenceTensor,
        labels: SequenceTensor,
        batch_size: usize,
        num_classes: usize,
        alignment: AlignmentMode,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::validation("minibatch size must be positive"));
        }
        if num_classes == 0 {
            return Err(Error::validation("class count must be positive"));
        }
        if features.len() != labels.len() {
            return Err(Error::validation(format!(
                "{} feature sequences but {} label sequences",
                features.len(),
                labels.len()
            )));
        }
        if features.is_empty() {
            return Err(Error::validation("no sequences to iterate"));
        }

        Ok(SequenceDataSetIterator {
            features,
            labels,
            batch_size,
            num_classes,
            alignment,
            cursor: 0,
            pre_processor: None,
        })
    }

    /// Attach a pre-processor shared with other iterators or forecast calls
    pub fn set_pre_processor(&mut self, pre_processor: Rc<dyn DataSetPreProcessor>) {
        self.pre_processor = Some(pre_processor);
    }

    pub fn has_pre_processor(&self) -> bool {
        self.pre_processor.is_some()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn total_examples(&self) -> usize {
        self.features.len()
    }

    pub fn num_batches(&self) -> usize {
        (self.total_examples() + self.batch_size - 1) / self.batch_size
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.total_examples()
    }

    /// Rewind to the first minibatch
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Next minibatch with the pre-processor applied
    pub fn next_batch(&mut self) -> Option<Result<DataSet>> {
        let batch = self.next_unprocessed()?;
        Some(batch.and_then(|mut data| {
            if let Some(ref pre_processor) = self.pre_processor {
                pre_processor.pre_process(&mut data)?;
            }
            Ok(data)
        }))
    }

    /// Next minibatch exactly as aligned from the source tensors
    pub fn next_unprocessed(&mut self) -> Option<Result<DataSet>> {
        if !self.has_next() {
            return None;
        }
        let start = self.cursor;
        let end = (start + self.batch_size).min(self.total_examples());
        self.cursor = end;
        Some(self.build_batch(start, end))
    }

    fn build_batch(&self, start: usize, end: usize) -> Result<DataSet> {
        let features = &self.features.examples()[start..end];
        let labels = &self.labels.examples()[start..end];
        let channels = features[0].ncols();
        let steps = features
            .iter()
            .chain(labels.iter())
            .map(|example| example.nrows())
            .max()
            .unwrap_or(0);

        if self.alignment == AlignmentMode::EqualLength
            && features.iter().chain(labels.iter()).any(|example| example.nrows() != steps)
        {
            return Err(Error::validation(
                "sequences of different lengths under equal-length alignment",
            ));
        }

        let batch = end - start;
        let mut data = DataSet {
            features: Array3::zeros((batch, channels, steps)),
            labels: Array3::zeros((batch, self.num_classes, steps)),
            features_mask: Array2::zeros((batch, steps)),
            labels_mask: Array2::zeros((batch, steps)),
        };

        for (i, (x, y)) in features.iter().zip(labels.iter()).enumerate() {
            if x.ncols() != channels {
                return Err(Error::validation(format!(
                    "example {} has {} channels, expected {}",
                    start + i,
                    x.ncols(),
                    channels
                )));
            }
            if y.ncols() != 1 {
                return Err(Error::validation(format!("label sequence {} must have a single channel", start + i)));
            }

            let offset = self.offset(steps, x.nrows());
            for t in 0..x.nrows() {
                for c in 0..channels {
                    data.features[[i, c, offset + t]] = x[[t, c]];
                }
                data.features_mask[[i, offset + t]] = 1.0;
            }

            let offset = self.offset(steps, y.nrows());
            for t in 0..y.nrows() {
                let class = self.class_index(y[[t, 0]], start + i)?;
                data.labels[[i, class, offset + t]] = 1.0;
                data.labels_mask[[i, offset + t]] = 1.0;
            }
        }

        log::debug!("minibatch [{}..{}) with {} steps", start, end, steps);
        Ok(data)
    }

    fn offset(&self, steps: usize, len: usize) -> usize {
        match self.alignment {
            AlignmentMode::AlignEnd => steps - len,
            AlignmentMode::AlignStart | AlignmentMode::EqualLength => 0,
        }
    }

    fn class_index(&self, value: f64, example: usize) -> Result<usize> {
        if value >= 0.0 && value.fract() == 0.0 && (value as usize) < self.num_classes {
            Ok(value as usize)
        } else {
            Err(Error::validation(format!(
                "label {} of example {} is not a class index below {}",
                value, example, self.num_classes
            )))
        }
    }
}

impl Iterator for SequenceDataSetIterator {
    type Item = Result<DataSet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterator(rows: &[&str], labels: &[usize], batch: usize, alignment: AlignmentMode) -> SequenceDataSetIterator {
        let features = SequenceTensor::tensorize(rows).unwrap();
        let labels = SequenceTensor::from_labels(labels);
        SequenceDataSetIterator::new(features, labels, batch, 3, alignment).unwrap()
    }

    #[test]
    fn test_end_alignment_pads_at_start() {
        let mut it = iterator(&["1 2 3 4", "5 6"], &[0, 2], 2, AlignmentMode::AlignEnd);
        let data = it.next().unwrap().unwrap();

        assert_eq!(data.features.shape(), &[2, 1, 4]);
        assert_eq!(data.features.slice(ndarray::s![1, 0, ..]).to_vec(), vec![0.0, 0.0, 5.0, 6.0]);
        assert_eq!(data.features_mask.row(1).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(data.features_mask.row(0).to_vec(), vec![1.0, 1.0, 1.0, 1.0]);

        // labels sit on the final step only
        assert_eq!(data.labels_mask.row(0).to_vec(), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(data.labels.slice(ndarray::s![0, .., 3]).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(data.labels.slice(ndarray::s![1, .., 3]).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(data.labels.slice(ndarray::s![1, .., 0]).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_start_alignment_pads_at_end() {
        let mut it = iterator(&["1 2 3", "4 5"], &[1, 1], 2, AlignmentMode::AlignStart);
        let data = it.next().unwrap().unwrap();
        assert_eq!(data.features.slice(ndarray::s![1, 0, ..]).to_vec(), vec![4.0, 5.0, 0.0]);
        assert_eq!(data.labels_mask.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_equal_length_rejects_ragged_batch() {
        let mut it = iterator(&["1 2 3", "4 5 6"], &[1, 1], 2, AlignmentMode::EqualLength);
        assert!(matches!(it.next(), Some(Err(Error::Validation(_)))));
    }

    #[test]
    fn test_last_batch_is_partial() {
        let rows = ["1 2", "3 4", "5 6", "7 8", "9 10"];
        let mut it = iterator(&rows, &[0, 1, 2, 0, 1], 2, AlignmentMode::AlignEnd);
        assert_eq!(it.num_batches(), 3);
        let sizes: Vec<usize> = it.by_ref().map(|b| b.unwrap().num_examples()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(!it.has_next());
    }

    #[test]
    fn test_reset_replays_first_batch() {
        let rows = ["1 2", "3 4", "5 6"];
        let mut it = iterator(&rows, &[0, 1, 2], 2, AlignmentMode::AlignEnd);
        let first = it.next().unwrap().unwrap();
        while it.next().is_some() {}
        assert!(it.next().is_none());

        it.reset();
        let again = it.next().unwrap().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_label_out_of_range_is_rejected() {
        let mut it = iterator(&["1 2"], &[3], 1, AlignmentMode::AlignEnd);
        assert!(matches!(it.next(), Some(Err(Error::Validation(_)))));
    }

    #[test]
    fn test_mismatched_counts_are_rejected() {
        let features = SequenceTensor::tensorize(&["1 2", "3 4"]).unwrap();
        let labels = SequenceTensor::from_labels(&[0]);
        assert!(SequenceDataSetIterator::new(features, labels, 1, 2, AlignmentMode::AlignEnd).is_err());
    }

    struct AddOne;

    impl DataSetPreProcessor for AddOne {
        fn pre_process(&self, data: &mut DataSet) -> Result<()> {
            data.features.mapv_inplace(|v| v + 1.0);
            Ok(())
        }
    }

    #[test]
    fn test_pre_processor_applies_to_processed_batches_only() {
        let mut it = iterator(&["1 2"], &[0], 1, AlignmentMode::AlignEnd);
        it.set_pre_processor(Rc::new(AddOne));

        let processed = it.next().unwrap().unwrap();
        assert_eq!(processed.features[[0, 0, 0]], 2.0);

        it.reset();
        let raw = it.next_unprocessed().unwrap().unwrap();
        assert_eq!(raw.features[[0, 0, 0]], 1.0);
    }
}
