use ndarray::{Array1, Array2};
use rand::Rng;

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;
use crate::utils::expand_mask;

/// Holds cached values for all layers at one timestep
#[derive(Clone, Debug)]
pub struct LSTMNetworkCache {
    pub cell_caches: Vec<LSTMCellCache>,
}

/// Everything the backward pass needs from a full sequence forward pass
#[derive(Clone, Debug)]
pub struct SequenceCache {
    pub steps: Vec<LSTMNetworkCache>,
    /// Per-step `(hidden_size, batch)` keep masks; `None` when every step is real
    pub keep: Vec<Option<Array2<f64>>>,
}

/// Multi-layer LSTM network over batched, optionally masked sequences
///
/// Stacks LSTM cells where the output of layer i becomes the input to layer i+1.
/// On masked-out timesteps every layer carries its previous state forward unchanged,
/// so sequences padded at the start behave as if they began at their first real step.
#[derive(Clone, Debug)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
}

impl LSTMNetwork {
    /// Creates a new multi-layer LSTM network
    ///
    /// First layer accepts `input_size` dimensions, subsequent layers
    /// accept `hidden_size` dimensions from the previous layer.
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut R) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new(layer_input_size, hidden_size, rng)
            })
            .collect();

        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    /// Creates a network from existing cells (used for deserialization)
    pub fn from_cells(cells: Vec<LSTMCell>, input_size: usize, hidden_size: usize) -> Self {
        let num_layers = cells.len();
        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    /// Get reference to the cells (used for serialization)
    pub fn get_cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    /// Zero `(hidden, cell)` states for every layer
    pub fn initial_states(&self, batch: usize) -> Vec<(Array2<f64>, Array2<f64>)> {
        (0..self.num_layers)
            .map(|_| (Array2::zeros((self.hidden_size, batch)), Array2::zeros((self.hidden_size, batch))))
            .collect()
    }

    /// One timestep through every layer; returns the new per-layer states
    pub fn forward_with_cache(
        &self,
        input: &Array2<f64>,
        states: &[(Array2<f64>, Array2<f64>)],
        keep: Option<&Array2<f64>>,
    ) -> (Vec<(Array2<f64>, Array2<f64>)>, LSTMNetworkCache) {
        let mut current_input = input.clone();
        let mut new_states = Vec::with_capacity(self.num_layers);
        let mut cell_caches = Vec::with_capacity(self.num_layers);

        for (cell, (hx, cx)) in self.cells.iter().zip(states.iter()) {
            let (hy, cy, cache) = cell.forward_with_cache(&current_input, hx, cx);
            let (hy, cy) = match keep {
                Some(keep) => (blend(&hy, hx, keep), blend(&cy, cx, keep)),
                None => (hy, cy),
            };
            cell_caches.push(cache);

            // Layer i+1 input is layer i hidden output
            current_input = hy.clone();
            new_states.push((hy, cy));
        }

        (new_states, LSTMNetworkCache { cell_caches })
    }

    /// Process a whole sequence of `(input_size, batch)` steps from zero state
    ///
    /// `mask` holds one `(batch,)` vector per step with 1.0 on real steps.
    /// Returns the top-layer hidden output of every step and the cache for BPTT.
    pub fn forward_sequence_with_cache(
        &self,
        sequence: &[Array2<f64>],
        mask: Option<&[Array1<f64>]>,
    ) -> (Vec<Array2<f64>>, SequenceCache) {
        let batch = sequence.first().map_or(0, |x| x.ncols());
        let mut states = self.initial_states(batch);
        let mut outputs = Vec::with_capacity(sequence.len());
        let mut steps = Vec::with_capacity(sequence.len());
        let mut keeps = Vec::with_capacity(sequence.len());

        for (t, input) in sequence.iter().enumerate() {
            let keep = mask
                .map(|m| &m[t])
                .filter(|m| m.iter().any(|&v| v == 0.0))
                .map(|m| expand_mask(m, self.hidden_size));
            let (new_states, cache) = self.forward_with_cache(input, &states, keep.as_ref());
            states = new_states;
            outputs.push(states[self.num_layers - 1].0.clone());
            steps.push(cache);
            keeps.push(keep);
        }

        (outputs, SequenceCache { steps, keep: keeps })
    }

    /// Backpropagation through time
    ///
    /// `d_outputs[t]` is the loss gradient with respect to the top-layer output at step `t`.
    /// Hidden and cell gradients flow backwards across steps and down through the layers;
    /// masked-out steps pass them straight through to the previous step.
    pub fn backward_sequence(&self, d_outputs: &[Array2<f64>], cache: &SequenceCache) -> Vec<LSTMCellGradients> {
        let mut gradients = self.zero_gradients();
        let batch = d_outputs.first().map_or(0, |d| d.ncols());
        let mut dh_next: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];
        let mut dc_next: Vec<Array2<f64>> = vec![Array2::zeros((self.hidden_size, batch)); self.num_layers];

        for t in (0..d_outputs.len()).rev() {
            let keep = cache.keep[t].as_ref();
            let mut dh_above = d_outputs[t].clone();

            for layer in (0..self.num_layers).rev() {
                let dh = &dh_above + &dh_next[layer];
                let dc = dc_next[layer].clone();

                let (dh_cell, dc_cell, dh_skip, dc_skip) = match keep {
                    Some(keep) => {
                        let skip = keep.mapv(|k| 1.0 - k);
                        (&dh * keep, &dc * keep, Some(&dh * &skip), Some(&dc * &skip))
                    }
                    None => (dh, dc, None, None),
                };

                let (step_gradients, dx, dhx, dcx) =
                    self.cells[layer].backward(&dh_cell, &dc_cell, &cache.steps[t].cell_caches[layer]);
                gradients[layer].accumulate(&step_gradients);

                dh_next[layer] = match dh_skip {
                    Some(skip) => dhx + &skip,
                    None => dhx,
                };
                dc_next[layer] = match dc_skip {
                    Some(skip) => dcx + &skip,
                    None => dcx,
                };
                dh_above = dx;
            }
        }

        gradients
    }

    /// Update parameters for all layers using computed gradients
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &[LSTMCellGradients], optimizer: &mut O) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients.iter()).enumerate() {
            let prefix = format!("layer_{}", i);
            cell.update_parameters(cell_gradients, optimizer, &prefix);
        }
    }

    /// Initialize zero gradients for all layers
    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(|cell| cell.num_parameters()).sum()
    }
}

/// `keep ⊙ new + (1 - keep) ⊙ previous`
fn blend(new: &Array2<f64>, previous: &Array2<f64>, keep: &Array2<f64>) -> Array2<f64> {
    new * keep + &(previous * &keep.mapv(|k| 1.0 - k))
}
