use ndarray::Array2;

use crate::error::{Error, Result};

/// Examples of shape `[count][timesteps][channels]`, one `(timesteps, channels)` matrix each
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceTensor {
    examples: Vec<Array2<f64>>,
    value_range: Option<(f64, f64)>,
}

impl SequenceTensor {
    /// Parse raw rows into single-channel sequences.
    ///
    /// A row with several whitespace-separated tokens yields one timestep per token;
    /// a row with a single token yields one timestep. Any token that is not a decimal
    /// fails the whole call with the offending row.
    pub fn tensorize<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let mut examples = Vec::with_capacity(rows.len());
        let mut range: Option<(f64, f64)> = None;

        for row in rows {
            let row = row.as_ref();
            let values = parse_row(row)?;
            if values.len() > 1 {
                for &v in &values {
                    range = Some(match range {
                        Some((min, max)) => (min.min(v), max.max(v)),
                        None => (v, v),
                    });
                }
            }
            let steps = values.len();
            let example = Array2::from_shape_vec((steps, 1), values)
                .map_err(|e| Error::validation(format!("row '{}' has no usable shape: {}", row, e)))?;
            examples.push(example);
        }

        let tensor = SequenceTensor {
            examples,
            value_range: range,
        };
        if let Some((min, max)) = tensor.value_range {
            log::info!("feature range in dataset [{} .. {}]", min, max);
        }
        let (count, steps, channels) = tensor.shape();
        log::info!("sequence tensor: [{}][{}][{}]", count, steps, channels);
        Ok(tensor)
    }

    /// One single-step, single-channel sequence per label
    pub fn from_labels(labels: &[usize]) -> Self {
        SequenceTensor {
            examples: labels.iter().map(|&l| Array2::from_elem((1, 1), l as f64)).collect(),
            value_range: None,
        }
    }

    pub fn examples(&self) -> &[Array2<f64>] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// `(count, timesteps of the first example, channels of the first example)`
    pub fn shape(&self) -> (usize, usize, usize) {
        match self.examples.first() {
            Some(first) => (self.examples.len(), first.nrows(), first.ncols()),
            None => (0, 0, 0),
        }
    }

    /// Observed `(min, max)` over feature rows, for diagnostics only
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.value_range
    }
}

/// Parse one whitespace-separated row of decimals
pub fn parse_row(row: &str) -> Result<Vec<f64>> {
    let values = row
        .split_whitespace()
        .map(|token| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(Error::Parse {
                line: row.to_string(),
                token: token.to_string(),
            }),
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.is_empty() {
        return Err(Error::Parse {
            line: row.to_string(),
            token: String::new(),
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_row_becomes_timesteps() {
        let tensor = SequenceTensor::tensorize(&["1.5 -2.0 3.25 4"]).unwrap();
        assert_eq!(tensor.shape(), (1, 4, 1));
        let values: Vec<f64> = tensor.examples()[0].column(0).to_vec();
        assert_eq!(values, vec![1.5, -2.0, 3.25, 4.0]);
    }

    #[test]
    fn test_single_value_row_is_one_timestep() {
        let tensor = SequenceTensor::tensorize(&["3"]).unwrap();
        assert_eq!(tensor.shape(), (1, 1, 1));
        assert_eq!(tensor.examples()[0][[0, 0]], 3.0);
        assert_eq!(tensor.value_range(), None);
    }

    #[test]
    fn test_irregular_spacing_is_accepted() {
        let tensor = SequenceTensor::tensorize(&["  28.7812  34.4632\t31.3381 "]).unwrap();
        assert_eq!(tensor.shape(), (1, 3, 1));
    }

    #[test]
    fn test_value_range_tracks_all_rows() {
        let tensor = SequenceTensor::tensorize(&["1 2 3", "-4 5 6", "7"]).unwrap();
        assert_eq!(tensor.len(), 3);
        assert_eq!(tensor.value_range(), Some((-4.0, 6.0)));
    }

    #[test]
    fn test_bad_token_fails_whole_batch() {
        let result = SequenceTensor::tensorize(&["1 2 3", "4 x5 6"]);
        match result {
            Err(Error::Parse { line, token }) => {
                assert_eq!(line, "4 x5 6");
                assert_eq!(token, "x5");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_token_is_rejected() {
        assert!(matches!(SequenceTensor::tensorize(&["1 NaN 3"]), Err(Error::Parse { .. })));
        assert!(matches!(SequenceTensor::tensorize(&["inf"]), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_blank_row_is_parse_error() {
        assert!(matches!(SequenceTensor::tensorize(&["1 2", "   "]), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_labels_are_single_step() {
        let tensor = SequenceTensor::from_labels(&[0, 5, 2]);
        assert_eq!(tensor.shape(), (3, 1, 1));
        assert_eq!(tensor.examples()[1][[0, 0]], 5.0);
    }
}
