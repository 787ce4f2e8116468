use chrono::{DateTime, Utc};
use ndarray::{Array2, Dimension};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::config::LstmConfig;
use crate::data::normalize::NormalizationStatistics;
use crate::error::{Error, Result};
use crate::layers::linear::LinearLayer;
use crate::layers::lstm_cell::LSTMCell;
use crate::models::classifier::LSTMClassifier;
use crate::models::lstm_network::LSTMNetwork;

/// Serializable version of Array2<f64> for persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableArray2 {
    data: Vec<f64>,
    shape: (usize, usize),
}

impl From<&Array2<f64>> for SerializableArray2 {
    fn from(array: &Array2<f64>) -> Self {
        Self {
            data: array.iter().cloned().collect(),
            shape: array.raw_dim().into_pattern(),
        }
    }
}

impl TryFrom<SerializableArray2> for Array2<f64> {
    type Error = Error;

    fn try_from(array: SerializableArray2) -> Result<Self> {
        let shape = array.shape;
        Array2::from_shape_vec(shape, array.data)
            .map_err(|e| Error::Serialization(format!("matrix of shape {:?}: {}", shape, e)))
    }
}

/// Serializable LSTM cell parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableLSTMCell {
    w_ih: SerializableArray2,
    w_hh: SerializableArray2,
    b_ih: SerializableArray2,
    b_hh: SerializableArray2,
    input_size: usize,
    hidden_size: usize,
}

impl From<&LSTMCell> for SerializableLSTMCell {
    fn from(cell: &LSTMCell) -> Self {
        Self {
            w_ih: (&cell.w_ih).into(),
            w_hh: (&cell.w_hh).into(),
            b_ih: (&cell.b_ih).into(),
            b_hh: (&cell.b_hh).into(),
            input_size: cell.input_size,
            hidden_size: cell.hidden_size,
        }
    }
}

impl TryFrom<SerializableLSTMCell> for LSTMCell {
    type Error = Error;

    fn try_from(cell: SerializableLSTMCell) -> Result<Self> {
        let (h, i) = (cell.hidden_size, cell.input_size);
        let restored = LSTMCell {
            w_ih: cell.w_ih.try_into()?,
            w_hh: cell.w_hh.try_into()?,
            b_ih: cell.b_ih.try_into()?,
            b_hh: cell.b_hh.try_into()?,
            input_size: i,
            hidden_size: h,
        };
        if restored.w_ih.dim() != (4 * h, i)
            || restored.w_hh.dim() != (4 * h, h)
            || restored.b_ih.dim() != (4 * h, 1)
            || restored.b_hh.dim() != (4 * h, 1)
        {
            return Err(Error::Serialization(format!(
                "LSTM cell parameters do not match input size {} and hidden size {}",
                i, h
            )));
        }
        Ok(restored)
    }
}

/// Serializable LSTM network
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableLSTMNetwork {
    cells: Vec<SerializableLSTMCell>,
    input_size: usize,
    hidden_size: usize,
}

impl From<&LSTMNetwork> for SerializableLSTMNetwork {
    fn from(network: &LSTMNetwork) -> Self {
        Self {
            cells: network.get_cells().iter().map(|cell| cell.into()).collect(),
            input_size: network.input_size,
            hidden_size: network.hidden_size,
        }
    }
}

impl TryFrom<SerializableLSTMNetwork> for LSTMNetwork {
    type Error = Error;

    fn try_from(network: SerializableLSTMNetwork) -> Result<Self> {
        let cells = network
            .cells
            .into_iter()
            .map(LSTMCell::try_from)
            .collect::<Result<Vec<LSTMCell>>>()?;
        if cells.is_empty() {
            return Err(Error::Serialization("network has no layers".to_string()));
        }
        for (layer, cell) in cells.iter().enumerate() {
            let expected_input = if layer == 0 { network.input_size } else { network.hidden_size };
            if cell.input_size != expected_input || cell.hidden_size != network.hidden_size {
                return Err(Error::Serialization(format!(
                    "layer {} is {} -> {}, network expects {} -> {}",
                    layer, cell.input_size, cell.hidden_size, expected_input, network.hidden_size
                )));
            }
        }
        Ok(LSTMNetwork::from_cells(cells, network.input_size, network.hidden_size))
    }
}

/// Serializable output layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableLinearLayer {
    weight: SerializableArray2,
    bias: SerializableArray2,
}

impl From<&LinearLayer> for SerializableLinearLayer {
    fn from(layer: &LinearLayer) -> Self {
        Self {
            weight: (&layer.weight).into(),
            bias: (&layer.bias).into(),
        }
    }
}

impl TryFrom<SerializableLinearLayer> for LinearLayer {
    type Error = Error;

    fn try_from(layer: SerializableLinearLayer) -> Result<Self> {
        let weight: Array2<f64> = layer.weight.try_into()?;
        let bias: Array2<f64> = layer.bias.try_into()?;
        if bias.dim() != (weight.nrows(), 1) {
            return Err(Error::Serialization("output bias does not match weight rows".to_string()));
        }
        Ok(LinearLayer::from_weights(weight, bias))
    }
}

/// Serializable LSTM + softmax classifier
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableClassifier {
    network: SerializableLSTMNetwork,
    output_layer: SerializableLinearLayer,
}

impl From<&LSTMClassifier> for SerializableClassifier {
    fn from(classifier: &LSTMClassifier) -> Self {
        Self {
            network: (&classifier.network).into(),
            output_layer: (&classifier.output_layer).into(),
        }
    }
}

impl TryFrom<SerializableClassifier> for LSTMClassifier {
    type Error = Error;

    fn try_from(classifier: SerializableClassifier) -> Result<Self> {
        let network = LSTMNetwork::try_from(classifier.network)?;
        let output_layer = LinearLayer::try_from(classifier.output_layer)?;
        if output_layer.input_size != network.hidden_size {
            return Err(Error::Serialization(format!(
                "output layer expects {} inputs, network produces {}",
                output_layer.input_size, network.hidden_size
            )));
        }
        Ok(LSTMClassifier::from_parts(network, output_layer))
    }
}

/// Model metadata for tracking training information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_classes: usize,
    pub total_epochs: usize,
    pub final_score: Option<f64>,
    pub test_accuracy: Option<f64>,
    pub description: Option<String>,
}

/// Complete saved model: classifier, the statistics its inputs were standardized with,
/// the configuration it was trained under and metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub classifier: SerializableClassifier,
    pub normalization: Option<NormalizationStatistics>,
    pub config: LstmConfig,
    pub metadata: ModelMetadata,
}

/// On-disk encoding of a saved model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    Binary,
}

impl ModelFormat {
    /// `.json` selects JSON; anything else is binary
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => ModelFormat::Json,
            _ => ModelFormat::Binary,
        }
    }
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Save model to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load model from JSON format
    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let model = serde_json::from_str(&contents)?;
        Ok(model)
    }

    /// Save model to binary format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let encoded = bincode::serialize(model)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load model from binary format
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        let mut file = File::open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let model = bincode::deserialize(&contents)?;
        Ok(model)
    }

    /// Save in the format chosen by the file extension
    pub fn save<P: AsRef<Path>>(model: &SavedModel, path: P) -> Result<()> {
        let format = ModelFormat::from_path(&path);
        log::info!("saving model to {} as {:?}", path.as_ref().display(), format);
        match format {
            ModelFormat::Json => Self::save_to_json(model, path),
            ModelFormat::Binary => Self::save_to_binary(model, path),
        }
    }

    /// Load in the format chosen by the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SavedModel> {
        match ModelFormat::from_path(&path) {
            ModelFormat::Json => Self::load_from_json(path),
            ModelFormat::Binary => Self::load_from_binary(path),
        }
    }

    /// Create a model with metadata
    pub fn create_saved_model(
        classifier: &LSTMClassifier,
        normalization: Option<NormalizationStatistics>,
        config: &LstmConfig,
        final_score: Option<f64>,
        test_accuracy: Option<f64>,
        description: Option<String>,
    ) -> SavedModel {
        let metadata = ModelMetadata {
            model_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            input_size: classifier.input_size(),
            hidden_size: classifier.hidden_size(),
            num_classes: classifier.num_classes,
            total_epochs: config.num_epochs,
            final_score,
            test_accuracy,
            description,
        };

        SavedModel {
            classifier: classifier.into(),
            normalization,
            config: config.clone(),
            metadata,
        }
    }
}
