/// Module for stacked LSTM networks.
pub mod lstm_network;

/// Module for the LSTM + softmax sequence classifier.
pub mod classifier;
