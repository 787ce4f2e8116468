//! # LSTM Control Chart Classifier
//!
//! Sequence classification of the UCI synthetic control chart dataset with a
//! batched, masked LSTM trained by backpropagation through time.
//!
//! ## Core Components
//!
//! - **Data pipeline**: raw rows → labeled pairs → seeded shuffle → train/test split →
//!   end-aligned, masked minibatches → standardization
//! - **Network**: LSTM layer followed by a per-timestep softmax output layer
//! - **Training**: masked cross-entropy, gradient clipping, SGD/Adam/Nadam updaters
//! - **Evaluation**: accuracy, precision, recall, F1 and the confusion matrix
//! - **Driver**: [`SequenceModel`] configures, trains, evaluates, forecasts and persists
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lstm_control_chart::{CollectionParser, DataSource, LstmConfig, SequenceModel, UciSequenceParser};
//!
//! # fn main() -> lstm_control_chart::Result<()> {
//! let config = LstmConfig::default();
//! let source = DataSource::File("synthetic_control.data".into());
//! let mut data = UciSequenceParser::new(&config).parse(Some(&source))?;
//!
//! let mut model = SequenceModel::new(config)?;
//! model.configure()?;
//! model.train(&mut data.train, &mut data.test)?;
//! println!("{}", model.evaluate(&mut data.test)?.stats());
//!
//! let forecast = model.forecast(&data.test_pairs[0].features)?;
//! println!("predicted class {}", forecast.predicted_class());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod layers;
pub mod loss;
pub mod model;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod sweep;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::{GradientNormalization, LstmConfig, Updater, CONTROL_CHART_LABELS};
pub use data::iterator::{AlignmentMode, DataSet, DataSetPreProcessor, SequenceDataSetIterator};
pub use data::labeling::FeatureLabelPair;
pub use data::normalize::{NormalizationStatistics, NormalizerStandardize};
pub use data::parser::{CollectionParser, ParsedDataset, UciSequenceParser};
pub use data::source::DataSource;
pub use data::split::SplitPolicy;
pub use data::tensor::SequenceTensor;
pub use error::{Error, Result};
pub use evaluation::Evaluation;
pub use layers::lstm_cell::LSTMCell;
pub use loss::CrossEntropyLoss;
pub use model::{Forecast, ModelState, SequenceModel};
pub use models::classifier::LSTMClassifier;
pub use models::lstm_network::LSTMNetwork;
pub use optimizers::{Adam, Nadam, SGD};
pub use persistence::{ModelMetadata, ModelPersistence, SavedModel};
pub use sweep::{run_trial, BestTrial, TrialResult};
pub use training::{LSTMTrainer, TrainingConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_library_integration() {
        let classifier = LSTMClassifier::new(1, 3, CONTROL_CHART_LABELS.len(), 123);
        let features = Array3::from_elem((2, 1, 5), 0.1);

        let probabilities = classifier.output(&features, None);

        assert_eq!(probabilities.shape(), &[2, 6, 5]);
    }
}
