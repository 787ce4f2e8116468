use ndarray::{Array1, Array2, Array3, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::iterator::SequenceDataSetIterator;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::loss::softmax;
use crate::models::lstm_network::{LSTMNetwork, SequenceCache};
use crate::optimizers::Optimizer;

/// Gradients of every classifier parameter
#[derive(Clone, Debug)]
pub struct ClassifierGradients {
    pub lstm: Vec<LSTMCellGradients>,
    pub output: LinearGradients,
}

impl ClassifierGradients {
    /// Every gradient matrix, one per parameter type per layer
    pub fn matrices_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut matrices: Vec<&mut Array2<f64>> = self.lstm.iter_mut().flat_map(|g| g.matrices_mut()).collect();
        matrices.extend(self.output.matrices_mut());
        matrices
    }
}

/// Forward state kept for backpropagation
#[derive(Clone, Debug)]
pub struct ClassifierCache {
    pub sequence: SequenceCache,
    /// Top LSTM layer output at every step, `(hidden_size, batch)`
    pub hidden: Vec<Array2<f64>>,
}

/// LSTM layer followed by a softmax output layer applied at every timestep
#[derive(Clone, Debug)]
pub struct LSTMClassifier {
    pub network: LSTMNetwork,
    pub output_layer: LinearLayer,
    pub num_classes: usize,
}

impl LSTMClassifier {
    /// Build a single-layer classifier with weights drawn from a generator seeded with `seed`
    pub fn new(input_size: usize, hidden_size: usize, num_classes: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let network = LSTMNetwork::new(input_size, hidden_size, 1, &mut rng);
        let output_layer = LinearLayer::new(hidden_size, num_classes, &mut rng);
        LSTMClassifier {
            network,
            output_layer,
            num_classes,
        }
    }

    /// Assemble a classifier from existing parts (used for deserialization)
    pub fn from_parts(network: LSTMNetwork, output_layer: LinearLayer) -> Self {
        let num_classes = output_layer.output_size;
        LSTMClassifier {
            network,
            output_layer,
            num_classes,
        }
    }

    pub fn input_size(&self) -> usize {
        self.network.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.network.hidden_size
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters() + self.output_layer.num_parameters()
    }

    /// Run `(batch, channels, timesteps)` features through the network
    ///
    /// Returns the raw `(classes, batch)` logits of every step.
    pub fn forward_with_cache(&self, features: &Array3<f64>, mask: Option<&Array2<f64>>) -> (Vec<Array2<f64>>, ClassifierCache) {
        let steps = features.shape()[2];
        let sequence: Vec<Array2<f64>> = (0..steps)
            .map(|t| features.index_axis(Axis(2), t).t().to_owned())
            .collect();
        let step_masks: Option<Vec<Array1<f64>>> = mask.map(|m| (0..steps).map(|t| m.column(t).to_owned()).collect());

        let (hidden, sequence_cache) = self.network.forward_sequence_with_cache(&sequence, step_masks.as_deref());
        let logits = hidden.iter().map(|h| self.output_layer.forward(h)).collect();

        (
            logits,
            ClassifierCache {
                sequence: sequence_cache,
                hidden,
            },
        )
    }

    /// Class probabilities `(batch, classes, timesteps)` for every step
    pub fn output(&self, features: &Array3<f64>, mask: Option<&Array2<f64>>) -> Array3<f64> {
        let (logits, _) = self.forward_with_cache(features, mask);
        let mut probabilities = Array3::zeros((features.shape()[0], self.num_classes, logits.len()));
        for (t, step) in logits.iter().enumerate() {
            probabilities.index_axis_mut(Axis(2), t).assign(&softmax(step).t());
        }
        probabilities
    }

    /// Backpropagate per-step logit gradients through the output layer and the LSTM
    pub fn backward(&self, d_logits: &[Array2<f64>], cache: &ClassifierCache) -> ClassifierGradients {
        let mut output = self.output_layer.zero_gradients();
        let mut d_hidden = Vec::with_capacity(d_logits.len());

        for (d_step, hidden) in d_logits.iter().zip(cache.hidden.iter()) {
            let (step_gradients, dh) = self.output_layer.backward(d_step, hidden);
            output.accumulate(&step_gradients);
            d_hidden.push(dh);
        }

        ClassifierGradients {
            lstm: self.network.backward_sequence(&d_hidden, &cache.sequence),
            output,
        }
    }

    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &ClassifierGradients, optimizer: &mut O) {
        self.network.update_parameters(&gradients.lstm, optimizer);
        self.output_layer.update_parameters(&gradients.output, optimizer, "output");
    }

    /// Score every batch of `data` and collect the labeled-step predictions
    ///
    /// The iterator is rewound before and after, so it can be reused for training.
    pub fn evaluate<S: AsRef<str>>(&self, data: &mut SequenceDataSetIterator, class_names: &[S]) -> Result<Evaluation> {
        let mut evaluation = if class_names.len() == self.num_classes {
            Evaluation::new(class_names)
        } else {
            Evaluation::with_classes(self.num_classes)
        };

        data.reset();
        while let Some(batch) = data.next_batch() {
            let batch = batch?;
            let probabilities = self.output(&batch.features, Some(&batch.features_mask));
            evaluation.eval(&batch.labels, &probabilities, Some(&batch.labels_mask))?;
        }
        data.reset();

        Ok(evaluation)
    }
}
