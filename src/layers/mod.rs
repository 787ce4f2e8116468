/// LSTM cell with batched forward and backward passes.
pub mod lstm_cell;

/// Dense layer used as the per-timestep output projection.
pub mod linear;
