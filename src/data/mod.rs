/// Line retrieval from files or HTTP.
pub mod source;

/// Row labeling and seeded shuffling.
pub mod labeling;

/// Train/test view construction.
pub mod split;

/// Raw rows to sequence tensors.
pub mod tensor;

/// Minibatch iteration with alignment and masks.
pub mod iterator;

/// Standardization fitted on training batches.
pub mod normalize;

/// The end-to-end parser tying the stages together.
pub mod parser;
